//! Health of the engine's two external dependencies.
//!
//! Storage decides whether the engine is serving at all. A lost transport
//! only degrades it: capture and aggregation keep running locally and
//! dashboards show a "disconnected" badge.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        *self == Self::Healthy
    }

    /// Tracking calls are still accepted and persisted.
    pub fn is_serving(&self) -> bool {
        *self != Self::Unhealthy
    }
}

#[derive(Debug, Default)]
struct State {
    healthy: bool,
    message: Option<String>,
    changed_at: Option<DateTime<Utc>>,
    /// Number of healthy/unhealthy flips
    flaps: u64,
}

/// Health of a single dependency. Starts unhealthy until first checked.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    state: RwLock<State>,
}

impl ComponentHealth {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(State::default()),
        }
    }

    pub fn set_healthy(&self) {
        self.update(true, None);
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.update(false, Some(msg.into()));
    }

    fn update(&self, healthy: bool, message: Option<String>) {
        let mut state = self.state.write();
        if state.healthy != healthy || state.changed_at.is_none() {
            if state.changed_at.is_some() {
                state.flaps += 1;
            }
            state.changed_at = Some(Utc::now());
            state.healthy = healthy;
        }
        state.message = message;
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.state.read().message.clone()
    }

    fn report(&self) -> ComponentHealthReport {
        let state = self.state.read();
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: state.healthy,
            message: state.message.clone(),
            since: state.changed_at,
            flaps: state.flaps,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
    /// When the component last changed state; `None` if never checked
    pub since: Option<DateTime<Utc>>,
    pub flaps: u64,
}

#[derive(Debug)]
pub struct HealthRegistry {
    pub transport: ComponentHealth,
    pub storage: ComponentHealth,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            transport: ComponentHealth::new("transport"),
            storage: ComponentHealth::new("storage"),
        }
    }

    pub fn report(&self) -> HealthReport {
        let status = match (self.storage.is_healthy(), self.transport.is_healthy()) {
            (false, _) => HealthStatus::Unhealthy,
            (true, false) => HealthStatus::Degraded,
            (true, true) => HealthStatus::Healthy,
        };
        HealthReport {
            status,
            components: vec![self.transport.report(), self.storage.report()],
        }
    }

    /// Whether tracking calls can be persisted.
    pub fn is_ready(&self) -> bool {
        self.storage.is_healthy()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
