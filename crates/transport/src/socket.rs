//! WebSocket transport.
//!
//! One driver task owns the socket. It writes heartbeats and outbound
//! frames, dispatches inbound messages, and on an unclean close walks the
//! backoff schedule until a new socket opens or the attempt budget runs
//! out.

use async_trait::async_trait;
use engine_core::{Error, MessageType, Result, TransportErrorCode, TransportMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::bus::{Handler, Subscription};
use crate::config::TransportConfig;
use crate::status::{ConnectionState, StatusEvent};
use crate::{Transport, TransportContext};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Grace period for the close handshake on disconnect.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// An established connection handed to the driver.
struct Link {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

#[derive(Default)]
struct Shared {
    /// Present while a link is up
    outbound: Option<mpsc::UnboundedSender<Message>>,
    queue: VecDeque<TransportMessage>,
    driver: Option<JoinHandle<()>>,
    closing: bool,
}

struct Inner {
    url: String,
    config: TransportConfig,
    ctx: TransportContext,
    shared: Mutex<Shared>,
}

/// WebSocket transport with heartbeat and bounded reconnect.
pub struct SocketTransport {
    inner: Arc<Inner>,
}

impl SocketTransport {
    pub fn new(url: impl Into<String>, config: TransportConfig, ctx: TransportContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                ctx,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Removes and returns every queued message, oldest first.
    pub fn take_queued(&self) -> Vec<TransportMessage> {
        let drained: Vec<_> = self.inner.shared.lock().queue.drain(..).collect();
        self.inner.update_queue_depth(0);
        drained
    }

    /// Stops the driver without emitting anything.
    fn halt(&self) -> Option<mpsc::UnboundedSender<Message>> {
        let mut shared = self.inner.shared.lock();
        shared.closing = true;
        if let Some(driver) = shared.driver.take() {
            driver.abort();
        }
        shared.outbound.take()
    }
}

impl Inner {
    fn is_closing(&self) -> bool {
        self.shared.lock().closing
    }

    fn update_queue_depth(&self, depth: usize) {
        if let Some(metrics) = &self.ctx.metrics {
            metrics.queue_depth.set(depth as u64);
        }
    }

    fn enqueue(&self, shared: &mut Shared, message: TransportMessage) {
        if self.config.max_queue == 0 {
            warn!(id = %message.id, "Outbound queue disabled, dropping message");
            return;
        }
        while shared.queue.len() >= self.config.max_queue {
            if let Some(dropped) = shared.queue.pop_front() {
                warn!(
                    id = %dropped.id,
                    message_type = dropped.message_type.as_str(),
                    "Outbound queue full, dropped oldest message"
                );
            }
        }
        shared.queue.push_back(message);
        self.update_queue_depth(shared.queue.len());
    }

    async fn open(&self) -> Result<WsStream> {
        let attempt = tokio::time::timeout(
            self.config.connect_timeout(),
            connect_async(self.url.as_str()),
        )
        .await;

        match attempt {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(Error::transport(
                TransportErrorCode::ConnectFailed,
                format!("failed to connect to {}: {}", self.url, e),
            )),
            Err(_) => Err(Error::transport(
                TransportErrorCode::ConnectTimeout,
                format!(
                    "no connection to {} after {}ms",
                    self.url, self.config.connect_timeout_ms
                ),
            )),
        }
    }

    /// Flushes the queue in order, then publishes the outbound sender.
    async fn establish(&self, ws: WsStream) -> Result<Link> {
        let (mut write, read) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tx = Some(tx);

        loop {
            let pending: Vec<TransportMessage> = {
                let mut shared = self.shared.lock();
                if shared.queue.is_empty() {
                    // Installed under the same lock so no send slips in between.
                    shared.outbound = tx.take();
                    break;
                }
                shared.queue.drain(..).collect()
            };

            let count = pending.len();
            let mut pending = VecDeque::from(pending);
            while let Some(message) = pending.pop_front() {
                let frame = serde_json::to_string(&message)?;
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    // Put the unsent tail back ahead of anything queued meanwhile.
                    let mut shared = self.shared.lock();
                    pending.push_front(message);
                    while let Some(m) = pending.pop_back() {
                        shared.queue.push_front(m);
                    }
                    return Err(Error::transport(
                        TransportErrorCode::ConnectFailed,
                        format!("flush failed: {}", e),
                    ));
                }
                if let Some(metrics) = &self.ctx.metrics {
                    metrics.messages_sent.inc();
                }
            }
            debug!(count, "Flushed queued messages");
        }

        self.update_queue_depth(0);
        self.ctx.status.emit(StatusEvent::Connected);

        Ok(Link {
            write,
            read,
            outbound: rx,
        })
    }

    fn heartbeat_frame(&self) -> String {
        serde_json::json!({
            "type": "heartbeat",
            "timestamp": self.ctx.clock.now(),
        })
        .to_string()
    }

    fn handle_frame(&self, text: &str) {
        match TransportMessage::parse(text) {
            Ok(Some(message)) => {
                if let Some(metrics) = &self.ctx.metrics {
                    metrics.messages_received.inc();
                }
                self.ctx.bus.dispatch(&message);
            }
            Ok(None) => debug!("Ignoring frame with unrecognized type"),
            Err(e) => warn!(error = %e, "Dropping malformed frame"),
        }
    }

    /// Runs one link until it closes. Returns whether the close was clean.
    async fn pump(&self, link: Link) -> bool {
        let Link {
            mut write,
            mut read,
            mut outbound,
        } = link;

        let mut heartbeat = heartbeat_interval(self.config.heartbeat_interval());

        loop {
            tokio::select! {
                _ = tick(&mut heartbeat) => {
                    let frame = self.heartbeat_frame();
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        self.ctx.status.emit(StatusEvent::Error { message: e.to_string() });
                        return false;
                    }
                }
                queued = outbound.recv() => match queued {
                    Some(Message::Close(frame)) => {
                        let _ = write.send(Message::Close(frame)).await;
                        let _ = write.close().await;
                        return true;
                    }
                    Some(frame) => {
                        if let Err(e) = write.send(frame).await {
                            self.ctx.status.emit(StatusEvent::Error { message: e.to_string() });
                            return false;
                        }
                    }
                    None => {
                        let _ = write.close().await;
                        return true;
                    }
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Close(frame))) => {
                        let clean = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                        debug!(clean, "Server closed the socket");
                        return clean;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.ctx.status.emit(StatusEvent::Error { message: e.to_string() });
                        return false;
                    }
                    None => return false,
                },
            }
        }
    }

    async fn reconnect_with_backoff(&self) -> Option<Link> {
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.reconnect_base_delay_ms),
            self.config.max_reconnect_attempts,
        );

        while let Some(delay) = backoff.next_delay() {
            self.ctx.status.emit(StatusEvent::Reconnecting {
                attempt: backoff.attempts(),
                delay_ms: delay.as_millis() as u64,
            });
            if let Some(metrics) = &self.ctx.metrics {
                metrics.reconnect_attempts.inc();
            }

            tokio::time::sleep(delay).await;
            if self.is_closing() {
                return None;
            }

            match self.open().await {
                Ok(ws) => match self.establish(ws).await {
                    Ok(link) => return Some(link),
                    Err(e) => self.ctx.status.emit(StatusEvent::Error {
                        message: e.to_string(),
                    }),
                },
                Err(e) => self.ctx.status.emit(StatusEvent::Error {
                    message: e.to_string(),
                }),
            }
        }

        self.ctx.status.emit(StatusEvent::GaveUp {
            attempts: backoff.attempts(),
        });
        None
    }

    async fn drive(self: Arc<Self>, mut link: Link) {
        loop {
            let clean = self.pump(link).await;
            self.shared.lock().outbound = None;

            if clean || self.is_closing() {
                self.ctx.status.emit(StatusEvent::Disconnected { clean: true });
                return;
            }

            self.ctx
                .status
                .emit(StatusEvent::Disconnected { clean: false });
            match self.reconnect_with_backoff().await {
                Some(next) => link = next,
                None => return,
            }
        }
    }
}

fn heartbeat_interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn connect(&self) -> Result<()> {
        if self.status().is_connected() {
            return Ok(());
        }

        {
            let mut shared = self.inner.shared.lock();
            shared.closing = false;
            if let Some(driver) = shared.driver.take() {
                driver.abort();
            }
        }

        self.inner.ctx.status.emit(StatusEvent::Connecting);
        info!(url = %self.inner.url, "Connecting transport");

        let link = match self.inner.open().await {
            Ok(ws) => self.inner.establish(ws).await,
            Err(e) => Err(e),
        };
        let link = match link {
            Ok(link) => link,
            Err(e) => {
                self.inner.ctx.status.emit(StatusEvent::Error {
                    message: e.to_string(),
                });
                self.inner
                    .ctx
                    .status
                    .emit(StatusEvent::Disconnected { clean: false });
                return Err(e);
            }
        };

        let inner = self.inner.clone();
        let driver = tokio::spawn(async move { inner.drive(link).await });
        self.inner.shared.lock().driver = Some(driver);
        Ok(())
    }

    fn send(&self, message: TransportMessage) {
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                return;
            }
        };

        let mut shared = self.inner.shared.lock();
        if let Some(tx) = &shared.outbound {
            if tx.send(Message::Text(frame.into())).is_ok() {
                if let Some(metrics) = &self.inner.ctx.metrics {
                    metrics.messages_sent.inc();
                }
                return;
            }
            shared.outbound = None;
        }
        self.inner.enqueue(&mut shared, message);
    }

    fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription {
        self.inner.ctx.bus.subscribe(message_type, handler)
    }

    async fn disconnect(&self) {
        let (outbound, driver) = {
            let mut shared = self.inner.shared.lock();
            shared.closing = true;
            (shared.outbound.take(), shared.driver.take())
        };

        match (outbound, driver) {
            (Some(tx), Some(driver)) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                let _ = tx.send(Message::Close(Some(frame)));
                drop(tx);

                let abort = driver.abort_handle();
                if tokio::time::timeout(CLOSE_GRACE, driver).await.is_err() {
                    abort.abort();
                    self.inner
                        .ctx
                        .status
                        .emit(StatusEvent::Disconnected { clean: true });
                }
            }
            (_, driver) => {
                if let Some(driver) = driver {
                    driver.abort();
                }
                if self.status() != ConnectionState::Disconnected {
                    self.inner
                        .ctx
                        .status
                        .emit(StatusEvent::Disconnected { clean: true });
                }
            }
        }
    }

    fn status(&self) -> ConnectionState {
        self.inner.ctx.status.state()
    }

    fn status_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.ctx.status.subscribe()
    }

    async fn reconnect(&self) -> Result<()> {
        if let Some(tx) = self.halt() {
            drop(tx);
        }
        self.inner.ctx.status.emit(StatusEvent::Disconnected { clean: true });
        self.connect().await
    }

    fn queued(&self) -> usize {
        self.inner.shared.lock().queue.len()
    }

    fn mode(&self) -> &'static str {
        "socket"
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(driver) = self.inner.shared.lock().driver.take() {
            driver.abort();
        }
    }
}
