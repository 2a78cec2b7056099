//! Publish/subscribe transport for the analytics engine.
//!
//! Two implementations sit behind one [`Transport`] trait:
//! - [`SocketTransport`]: WebSocket with heartbeats, a capped outbound
//!   queue and exponential-backoff reconnects
//! - [`SimulatedTransport`]: broadcast through a shared storage key plus
//!   periodic synthetic traffic
//!
//! [`FallbackTransport`] starts on the socket and drops to simulated mode
//! when no server answers.

pub mod backoff;
pub mod bus;
pub mod config;
pub mod fallback;
pub mod simulated;
pub mod socket;
pub mod status;

pub use backoff::Backoff;
pub use bus::{handler, Handler, SubscriberBus, Subscription};
pub use config::*;
pub use fallback::FallbackTransport;
pub use simulated::SimulatedTransport;
pub use socket::SocketTransport;
pub use status::*;

use async_trait::async_trait;
use engine_core::{MessageType, Result, SharedClock, TransportMessage};
use std::sync::Arc;
use storage::PersistenceGateway;
use telemetry::{HealthRegistry, Metrics};
use tokio::sync::broadcast;

/// A message bus reaching local subscribers and, depending on the mode,
/// a remote server or other engines sharing the same store.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once ready, or fails after the connect timeout.
    async fn connect(&self) -> Result<()>;

    /// Delivers or queues a message. Never fails; problems surface as
    /// status events.
    fn send(&self, message: TransportMessage);

    fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription;

    /// Tears the connection down and cancels every timer.
    async fn disconnect(&self);

    fn status(&self) -> ConnectionState;

    fn status_events(&self) -> broadcast::Receiver<StatusEvent>;

    /// Starts over with a fresh attempt budget.
    async fn reconnect(&self) -> Result<()>;

    /// Messages waiting for a connection.
    fn queued(&self) -> usize {
        0
    }

    fn mode(&self) -> &'static str;
}

/// Collaborators shared by every transport built for one engine.
#[derive(Clone)]
pub struct TransportContext {
    pub bus: SubscriberBus,
    pub status: Arc<StatusChannel>,
    pub clock: SharedClock,
    pub metrics: Option<Arc<Metrics>>,
}

impl TransportContext {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            bus: SubscriberBus::new(),
            status: Arc::new(StatusChannel::new(None)),
            clock,
            metrics: None,
        }
    }

    /// Reports connection state into `health`. Replaces the status channel,
    /// so call before building a transport.
    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.status = Arc::new(StatusChannel::new(Some(health)));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Builds the transport selected by `config.mode`.
pub fn build_transport(
    config: &TransportConfig,
    gateway: PersistenceGateway,
    ctx: TransportContext,
) -> Arc<dyn Transport> {
    match &config.mode {
        TransportMode::Simulated => Arc::new(SimulatedTransport::new(config.clone(), gateway, ctx)),
        TransportMode::Socket { url } if config.fallback_to_simulated => Arc::new(
            FallbackTransport::new(url.clone(), config.clone(), gateway, ctx),
        ),
        TransportMode::Socket { url } => {
            Arc::new(SocketTransport::new(url.clone(), config.clone(), ctx))
        }
    }
}
