//! Transport configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which transport implementation to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportMode {
    /// Real bidirectional WebSocket connection
    Socket { url: String },
    /// Storage-backed broadcast plus synthetic traffic
    #[default]
    Simulated,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// First reconnect delay in milliseconds; doubles per attempt
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Outbound queue cap while disconnected
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    /// Synthetic traffic interval in milliseconds (simulated mode, 0 disables)
    #[serde(default = "default_synthetic_interval_ms")]
    pub synthetic_interval_ms: u64,
    /// Switch to simulated mode when the socket cannot connect
    #[serde(default = "default_fallback_to_simulated")]
    pub fallback_to_simulated: bool,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_max_queue() -> usize {
    engine_core::limits::MAX_TRANSPORT_QUEUE
}

fn default_synthetic_interval_ms() -> u64 {
    5000
}

fn default_fallback_to_simulated() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            max_queue: default_max_queue(),
            synthetic_interval_ms: default_synthetic_interval_ms(),
            fallback_to_simulated: default_fallback_to_simulated(),
        }
    }
}

impl TransportConfig {
    pub fn socket(url: impl Into<String>) -> Self {
        Self {
            mode: TransportMode::Socket { url: url.into() },
            ..Self::default()
        }
    }

    pub fn simulated() -> Self {
        Self::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn synthetic_interval(&self) -> Duration {
        Duration::from_millis(self.synthetic_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_json() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"mode":{"kind":"socket","url":"ws://localhost:8080"}}"#)
                .unwrap();
        assert_eq!(
            config.mode,
            TransportMode::Socket {
                url: "ws://localhost:8080".to_string()
            }
        );
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.fallback_to_simulated);
    }
}
