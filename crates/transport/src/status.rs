//! Connection status tracking.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telemetry::HealthRegistry;
use tokio::sync::broadcast;
use tracing::{info, warn};

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Current connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted; stays here until `reconnect()`.
    GaveUp,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Status notifications. Socket failures surface here instead of as
/// errors to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    Connecting,
    Connected,
    Disconnected { clean: bool },
    Error { message: String },
    Reconnecting { attempt: u32, delay_ms: u64 },
    GaveUp { attempts: u32 },
}

/// State plus broadcast of status changes, mirrored into the health
/// registry when one is attached.
pub struct StatusChannel {
    state: Mutex<ConnectionState>,
    tx: broadcast::Sender<StatusEvent>,
    health: Option<Arc<HealthRegistry>>,
}

impl StatusChannel {
    pub fn new(health: Option<Arc<HealthRegistry>>) -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            tx,
            health,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Records and broadcasts a status event.
    pub fn emit(&self, event: StatusEvent) {
        let next = match &event {
            StatusEvent::Connecting => Some(ConnectionState::Connecting),
            StatusEvent::Connected => Some(ConnectionState::Connected),
            StatusEvent::Disconnected { .. } => Some(ConnectionState::Disconnected),
            StatusEvent::Reconnecting { .. } => Some(ConnectionState::Reconnecting),
            StatusEvent::GaveUp { .. } => Some(ConnectionState::GaveUp),
            StatusEvent::Error { .. } => None,
        };
        if let Some(next) = next {
            *self.state.lock() = next;
        }

        match &event {
            StatusEvent::Connected => info!("Transport connected"),
            StatusEvent::Disconnected { clean } => info!(clean, "Transport disconnected"),
            StatusEvent::Error { message } => warn!(error = %message, "Transport error"),
            StatusEvent::Reconnecting { attempt, delay_ms } => {
                info!(attempt, delay_ms, "Transport reconnecting")
            }
            StatusEvent::GaveUp { attempts } => {
                warn!(attempts, "Transport gave up reconnecting")
            }
            StatusEvent::Connecting => {}
        }

        if let Some(health) = &self.health {
            match &event {
                StatusEvent::Connected => health.transport.set_healthy(),
                StatusEvent::Disconnected { .. } => health.transport.set_unhealthy("disconnected"),
                StatusEvent::GaveUp { .. } => health.transport.set_unhealthy("gave up reconnecting"),
                StatusEvent::Error { message } => health.transport.set_unhealthy(message.clone()),
                _ => {}
            }
        }

        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}
