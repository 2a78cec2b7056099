//! Socket transport that degrades to simulated mode.

use async_trait::async_trait;
use engine_core::{MessageType, Result, TransportMessage};
use parking_lot::Mutex;
use storage::PersistenceGateway;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::bus::{Handler, Subscription};
use crate::config::TransportConfig;
use crate::simulated::SimulatedTransport;
use crate::socket::SocketTransport;
use crate::status::{ConnectionState, StatusEvent};
use crate::{Transport, TransportContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Socket,
    Simulated,
}

/// Tries the socket first; when it cannot connect, switches to the
/// simulated transport and hands over anything queued.
///
/// Both sides share one subscriber bus and one status channel, so
/// subscriptions survive the switch.
pub struct FallbackTransport {
    socket: SocketTransport,
    simulated: SimulatedTransport,
    active: Mutex<Active>,
}

impl FallbackTransport {
    pub fn new(
        url: impl Into<String>,
        config: TransportConfig,
        gateway: PersistenceGateway,
        ctx: TransportContext,
    ) -> Self {
        Self {
            socket: SocketTransport::new(url, config.clone(), ctx.clone()),
            simulated: SimulatedTransport::new(config, gateway, ctx),
            active: Mutex::new(Active::Socket),
        }
    }

    fn active(&self) -> Active {
        *self.active.lock()
    }

    pub fn is_degraded(&self) -> bool {
        self.active() == Active::Simulated
    }

    async fn degrade(&self) -> Result<()> {
        *self.active.lock() = Active::Simulated;
        self.simulated.connect().await?;
        let queued = self.socket.take_queued();
        if !queued.is_empty() {
            info!(count = queued.len(), "Handing queued messages to simulated transport");
        }
        for message in queued {
            self.simulated.send(message);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    async fn connect(&self) -> Result<()> {
        if self.active() == Active::Simulated {
            return self.simulated.connect().await;
        }
        match self.socket.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, url = %self.socket.url(), "Socket unavailable, switching to simulated mode");
                self.degrade().await
            }
        }
    }

    fn send(&self, message: TransportMessage) {
        match self.active() {
            Active::Socket => self.socket.send(message),
            Active::Simulated => self.simulated.send(message),
        }
    }

    fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription {
        self.socket.subscribe(message_type, handler)
    }

    async fn disconnect(&self) {
        match self.active() {
            Active::Socket => self.socket.disconnect().await,
            Active::Simulated => self.simulated.disconnect().await,
        }
    }

    fn status(&self) -> ConnectionState {
        self.socket.status()
    }

    fn status_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.socket.status_events()
    }

    /// Gives the socket another try; stays simulated if it still fails.
    async fn reconnect(&self) -> Result<()> {
        if self.active() == Active::Socket {
            return match self.socket.reconnect().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!(error = %e, "Reconnect failed, switching to simulated mode");
                    self.degrade().await
                }
            };
        }

        self.simulated.disconnect().await;
        match self.socket.connect().await {
            Ok(()) => {
                *self.active.lock() = Active::Socket;
                info!("Socket restored, left simulated mode");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Socket still unavailable");
                self.simulated.connect().await
            }
        }
    }

    fn queued(&self) -> usize {
        match self.active() {
            Active::Socket => self.socket.queued(),
            Active::Simulated => 0,
        }
    }

    fn mode(&self) -> &'static str {
        match self.active() {
            Active::Socket => self.socket.mode(),
            Active::Simulated => self.simulated.mode(),
        }
    }
}
