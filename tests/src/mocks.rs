//! Mock implementations for testing.

use async_trait::async_trait;
use engine_core::{Error, MessageType, Result, TransportErrorCode, TransportMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use transport::{
    ConnectionState, Handler, StatusChannel, StatusEvent, SubscriberBus, Subscription, Transport,
};

/// Transport that records every sent message and hands it to local
/// subscribers.
///
/// Implements the same `Transport` trait as the real transports, so the
/// engine runs its production code paths while tests inspect exactly what
/// would have gone over the wire.
#[derive(Clone)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<TransportMessage>>>,
    bus: SubscriberBus,
    status: Arc<StatusChannel>,
    /// Fail `connect` with a timeout if set.
    should_fail: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            bus: SubscriberBus::new(),
            status: Arc::new(StatusChannel::new(None)),
            should_fail: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// All messages sent so far.
    pub fn sent(&self) -> Vec<TransportMessage> {
        self.sent.lock().clone()
    }

    /// Sent messages of one type.
    pub fn sent_of(&self, message_type: MessageType) -> Vec<TransportMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Delivers a message as if it arrived from the server.
    pub fn inject(&self, message: TransportMessage) -> usize {
        self.bus.dispatch(&message)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.status.emit(StatusEvent::Connecting);
        if self.should_fail.load(Ordering::SeqCst) {
            self.status.emit(StatusEvent::GaveUp { attempts: 1 });
            return Err(Error::transport(
                TransportErrorCode::ConnectTimeout,
                "mock connect failure",
            ));
        }
        self.status.emit(StatusEvent::Connected);
        Ok(())
    }

    fn send(&self, message: TransportMessage) {
        self.bus.dispatch(&message);
        self.sent.lock().push(message);
    }

    fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription {
        self.bus.subscribe(message_type, handler)
    }

    async fn disconnect(&self) {
        self.status.emit(StatusEvent::Disconnected { clean: true });
    }

    fn status(&self) -> ConnectionState {
        self.status.state()
    }

    fn status_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    async fn reconnect(&self) -> Result<()> {
        self.connect().await
    }

    fn mode(&self) -> &'static str {
        "mock"
    }
}
