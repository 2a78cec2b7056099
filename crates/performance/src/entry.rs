//! Timing entries reported by the host and the capability check around them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of timing entry a host can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    Paint,
    LargestContentfulPaint,
    LayoutShift,
    FirstInput,
    Navigation,
    Longtask,
    Resource,
}

impl EntryKind {
    pub const ALL: [EntryKind; 7] = [
        EntryKind::Paint,
        EntryKind::LargestContentfulPaint,
        EntryKind::LayoutShift,
        EntryKind::FirstInput,
        EntryKind::Navigation,
        EntryKind::Longtask,
        EntryKind::Resource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paint => "paint",
            Self::LargestContentfulPaint => "largest-contentful-paint",
            Self::LayoutShift => "layout-shift",
            Self::FirstInput => "first-input",
            Self::Navigation => "navigation",
            Self::Longtask => "longtask",
            Self::Resource => "resource",
        }
    }
}

/// One timing entry. Times are milliseconds since navigation start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entryType", rename_all = "kebab-case")]
pub enum PerformanceEntry {
    Paint {
        name: String,
        start_time: f64,
    },
    LargestContentfulPaint {
        start_time: f64,
        #[serde(default)]
        size: u64,
    },
    LayoutShift {
        value: f64,
        #[serde(default)]
        had_recent_input: bool,
    },
    FirstInput {
        start_time: f64,
        processing_start: f64,
    },
    Navigation {
        #[serde(default)]
        request_start: f64,
        response_start: f64,
        #[serde(default)]
        dom_interactive: f64,
        #[serde(default)]
        dom_content_loaded: f64,
        #[serde(default)]
        load_event_end: f64,
    },
    Longtask {
        start_time: f64,
        duration: f64,
    },
    Resource {
        name: String,
        #[serde(default)]
        initiator_type: String,
        #[serde(default)]
        transfer_size: u64,
        #[serde(default)]
        duration: f64,
    },
}

impl PerformanceEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Paint { .. } => EntryKind::Paint,
            Self::LargestContentfulPaint { .. } => EntryKind::LargestContentfulPaint,
            Self::LayoutShift { .. } => EntryKind::LayoutShift,
            Self::FirstInput { .. } => EntryKind::FirstInput,
            Self::Navigation { .. } => EntryKind::Navigation,
            Self::Longtask { .. } => EntryKind::Longtask,
            Self::Resource { .. } => EntryKind::Resource,
        }
    }
}

/// Connection details reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(default)]
    pub effective_type: Option<String>,
    /// Mbit/s
    #[serde(default)]
    pub downlink: Option<f64>,
    /// Round-trip estimate in ms
    #[serde(default)]
    pub rtt: Option<f64>,
    #[serde(default)]
    pub save_data: bool,
}

/// What the host platform can observe.
pub trait PerformanceSource: Send + Sync {
    fn supports(&self, kind: EntryKind) -> bool;

    fn network_info(&self) -> Option<NetworkInfo> {
        None
    }
}

/// A platform with no timing instrumentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPerformanceSource;

impl PerformanceSource for NoopPerformanceSource {
    fn supports(&self, _kind: EntryKind) -> bool {
        false
    }
}

/// Capabilities declared by the host.
#[derive(Debug, Clone, Default)]
pub struct HostPerformanceSource {
    supported: BTreeSet<EntryKind>,
    network: Option<NetworkInfo>,
}

impl HostPerformanceSource {
    pub fn new(supported: impl IntoIterator<Item = EntryKind>) -> Self {
        Self {
            supported: supported.into_iter().collect(),
            network: None,
        }
    }

    /// Every entry kind.
    pub fn full() -> Self {
        Self::new(EntryKind::ALL)
    }

    pub fn with_network(mut self, network: NetworkInfo) -> Self {
        self.network = Some(network);
        self
    }
}

impl PerformanceSource for HostPerformanceSource {
    fn supports(&self, kind: EntryKind) -> bool {
        self.supported.contains(&kind)
    }

    fn network_info(&self) -> Option<NetworkInfo> {
        self.network.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_parses_from_host_json() {
        let entry: PerformanceEntry = serde_json::from_str(
            r#"{"entryType":"layout-shift","value":0.05,"had_recent_input":false}"#,
        )
        .unwrap();
        assert_eq!(entry.kind(), EntryKind::LayoutShift);
    }

    #[test]
    fn test_host_source_capabilities() {
        let source = HostPerformanceSource::new([EntryKind::Paint, EntryKind::Resource]);
        assert!(source.supports(EntryKind::Paint));
        assert!(!source.supports(EntryKind::Longtask));
        assert!(!NoopPerformanceSource.supports(EntryKind::Paint));
    }
}
