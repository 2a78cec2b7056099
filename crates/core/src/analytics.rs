//! Tracked analytics events and real-time aggregates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::clock::Timestamp;

/// Category of a tracked analytics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    PageView,
    Interaction,
    Conversion,
    Engagement,
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Interaction => "interaction",
            Self::Conversion => "conversion",
            Self::Engagement => "engagement",
            Self::Error => "error",
        }
    }
}

/// An event produced by a facade tracking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: String,
    pub name: String,
    pub category: EventCategory,
    pub page: String,
    pub session_id: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl AnalyticsEvent {
    pub fn new(
        name: impl Into<String>,
        category: EventCategory,
        page: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: Timestamp,
        properties: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            category,
            page: page.into(),
            session_id: session_id.into(),
            timestamp,
            properties,
        }
    }
}

/// Live counters shown on dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMetrics {
    pub page_views: u64,
    pub interactions: u64,
    pub errors: u64,
    /// Last visitor count reported over the transport
    pub active_visitors: u64,
    /// Views per page path
    pub pages: BTreeMap<String, u64>,
    pub last_updated: Timestamp,
}

impl RealtimeMetrics {
    pub fn unique_pages(&self) -> usize {
        self.pages.len()
    }

    /// The `n` most viewed pages, highest first; ties break by path.
    pub fn top_pages(&self, n: usize) -> Vec<(String, u64)> {
        let mut pages: Vec<(String, u64)> =
            self.pages.iter().map(|(p, c)| (p.clone(), *c)).collect();
        pages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pages.truncate(n);
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_pages_ordering() {
        let mut metrics = RealtimeMetrics::default();
        metrics.pages.insert("/blog".into(), 3);
        metrics.pages.insert("/".into(), 7);
        metrics.pages.insert("/about".into(), 3);
        let top = metrics.top_pages(2);
        assert_eq!(top, vec![("/".to_string(), 7), ("/about".to_string(), 3)]);
        assert_eq!(metrics.unique_pages(), 3);
    }
}
