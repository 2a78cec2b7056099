//! Simulated transport.
//!
//! Each sent message is written to the shared `broadcast` key and handed to
//! local subscribers right away. Other engines attached to the same store
//! pick the write up through the store's change feed. A recurring timer
//! synthesizes visitor, status and alert traffic so dashboards always have
//! something to show.

use async_trait::async_trait;
use engine_core::{
    Metric, MessageType, PerformanceAlert, Result, Severity, Timestamp, TransportMessage,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::keys;
use storage::PersistenceGateway;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use worker::WorkerScheduler;

use crate::bus::{Handler, Subscription};
use crate::config::TransportConfig;
use crate::status::{ConnectionState, StatusEvent};
use crate::{Transport, TransportContext};

const SYNTHETIC_WORKER: &str = "synthetic_traffic";

/// Chance per tick of an extra `system_status` message.
const STATUS_PROBABILITY: f64 = 0.1;
/// Chance per tick of an extra `performance_alert` message.
const ALERT_PROBABILITY: f64 = 0.05;
const MAX_SYNTHETIC_VISITORS: u64 = 25;

/// What gets written to the broadcast key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BroadcastEnvelope {
    origin: String,
    message: TransportMessage,
}

/// Storage-backed transport.
pub struct SimulatedTransport {
    config: TransportConfig,
    gateway: PersistenceGateway,
    ctx: TransportContext,
    /// Identifies this instance's own writes on the change feed
    origin: String,
    listener: Mutex<Option<JoinHandle<()>>>,
    timers: WorkerScheduler,
    rng: Arc<Mutex<StdRng>>,
}

impl SimulatedTransport {
    pub fn new(config: TransportConfig, gateway: PersistenceGateway, ctx: TransportContext) -> Self {
        Self::with_rng(config, gateway, ctx, StdRng::from_os_rng())
    }

    /// Uses a caller-supplied generator for synthetic traffic.
    pub fn with_rng(
        config: TransportConfig,
        gateway: PersistenceGateway,
        ctx: TransportContext,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            gateway,
            ctx,
            origin: Uuid::new_v4().to_string(),
            listener: Mutex::new(None),
            timers: WorkerScheduler::new(),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    fn start_listener(&self) {
        let Some(mut changes) = self.gateway.watch() else {
            warn!("Store has no change feed, cross-instance delivery disabled");
            return;
        };

        let key = self.gateway.key(keys::BROADCAST);
        let origin = self.origin.clone();
        let bus = self.ctx.bus.clone();
        let metrics = self.ctx.metrics.clone();

        let handle = tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Broadcast listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if change.key != key {
                    continue;
                }
                let Some(raw) = change.new_value else {
                    continue;
                };

                match serde_json::from_str::<BroadcastEnvelope>(&raw) {
                    Ok(envelope) if envelope.origin == origin => {}
                    Ok(envelope) => {
                        if let Some(metrics) = &metrics {
                            metrics.messages_received.inc();
                        }
                        bus.dispatch(&envelope.message);
                    }
                    Err(e) => warn!(error = %e, "Ignoring unreadable broadcast entry"),
                }
            }
            debug!("Broadcast listener stopped");
        });

        if let Some(old) = self.listener.lock().replace(handle) {
            old.abort();
        }
    }

    fn start_synthetic_traffic(&self) {
        let bus = self.ctx.bus.clone();
        let clock = self.ctx.clock.clone();
        let rng = self.rng.clone();

        self.timers
            .every(SYNTHETIC_WORKER, self.config.synthetic_interval(), move || {
                let messages = synthetic_messages(&mut rng.lock(), clock.now());
                for message in &messages {
                    bus.dispatch(message);
                }
            });
    }

    fn stop(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.timers.stop_all();
    }
}

/// One tick of synthetic traffic: always a visitor update, sometimes a
/// status report or a performance alert.
pub fn synthetic_messages(rng: &mut StdRng, now: Timestamp) -> Vec<TransportMessage> {
    let mut messages = vec![TransportMessage::new(
        MessageType::VisitorUpdate,
        serde_json::json!({
            "activeVisitors": rng.random_range(1..=MAX_SYNTHETIC_VISITORS),
            "source": "synthetic",
        }),
        now,
    )];

    if rng.random_bool(STATUS_PROBABILITY) {
        messages.push(TransportMessage::new(
            MessageType::SystemStatus,
            serde_json::json!({ "status": "operational", "source": "synthetic" }),
            now,
        ));
    }

    if rng.random_bool(ALERT_PROBABILITY) {
        let alert = PerformanceAlert {
            metric: Metric::Lcp,
            value: rng.random_range(2600.0..4500.0),
            threshold: 2500.0,
            severity: Severity::Warning,
            page: "/".to_string(),
            timestamp: now,
        };
        match TransportMessage::from_payload(MessageType::PerformanceAlert, &alert, now) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(error = %e, "Failed to build synthetic alert"),
        }
    }

    messages
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self) -> Result<()> {
        if self.status().is_connected() {
            return Ok(());
        }
        self.ctx.status.emit(StatusEvent::Connecting);
        self.start_listener();
        self.start_synthetic_traffic();
        self.ctx.status.emit(StatusEvent::Connected);
        info!(key = %self.gateway.key(keys::BROADCAST), "Simulated transport ready");
        Ok(())
    }

    fn send(&self, message: TransportMessage) {
        let envelope = BroadcastEnvelope {
            origin: self.origin.clone(),
            message,
        };
        if let Err(e) = self.gateway.save(keys::BROADCAST, &envelope) {
            warn!(error = %e, "Failed to write broadcast entry");
            if let Some(metrics) = &self.ctx.metrics {
                metrics.storage_errors.inc();
            }
        }
        if let Some(metrics) = &self.ctx.metrics {
            metrics.messages_sent.inc();
        }
        self.ctx.bus.dispatch(&envelope.message);
    }

    fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription {
        self.ctx.bus.subscribe(message_type, handler)
    }

    async fn disconnect(&self) {
        self.stop();
        if self.status() != ConnectionState::Disconnected {
            self.ctx.status.emit(StatusEvent::Disconnected { clean: true });
        }
    }

    fn status(&self) -> ConnectionState {
        self.ctx.status.state()
    }

    fn status_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.ctx.status.subscribe()
    }

    async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.connect().await
    }

    fn mode(&self) -> &'static str {
        "simulated"
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}
