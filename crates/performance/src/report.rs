//! Performance report snapshots.

use engine_core::{Metric, Timestamp, WebVitals};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::export::opt_cell;
use storage::CsvRecord;

use crate::entry::NetworkInfo;

/// Resource grouping used in the size breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Script,
    Stylesheet,
    Image,
    Font,
    Fetch,
    Other,
}

impl ResourceCategory {
    /// Classifies by initiator, falling back to the URL's extension.
    pub fn classify(initiator_type: &str, name: &str) -> Self {
        match initiator_type {
            "script" => return Self::Script,
            "css" | "link" if has_extension(name, &["css"]) => return Self::Stylesheet,
            "img" | "image" => return Self::Image,
            "fetch" | "xmlhttprequest" | "beacon" => return Self::Fetch,
            _ => {}
        }
        if has_extension(name, &["js", "mjs"]) {
            Self::Script
        } else if has_extension(name, &["css"]) {
            Self::Stylesheet
        } else if has_extension(name, &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"]) {
            Self::Image
        } else if has_extension(name, &["woff", "woff2", "ttf", "otf"]) {
            Self::Font
        } else {
            Self::Other
        }
    }
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    path.rsplit_once('.')
        .map(|(_, ext)| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTotals {
    pub count: u64,
    pub bytes: u64,
    pub duration_ms: f64,
}

/// Transfer sizes per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBreakdown {
    pub categories: BTreeMap<ResourceCategory, ResourceTotals>,
}

impl ResourceBreakdown {
    pub fn add(&mut self, category: ResourceCategory, bytes: u64, duration_ms: f64) {
        let totals = self.categories.entry(category).or_default();
        totals.count += 1;
        totals.bytes += bytes;
        totals.duration_ms += duration_ms.max(0.0);
    }

    pub fn total_count(&self) -> u64 {
        self.categories.values().map(|t| t.count).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.categories.values().map(|t| t.bytes).sum()
    }

    pub fn get(&self, category: ResourceCategory) -> ResourceTotals {
        self.categories.get(&category).copied().unwrap_or_default()
    }
}

/// A point-in-time view of page performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub id: String,
    pub timestamp: Timestamp,
    pub page: String,
    pub vitals: WebVitals,
    /// Estimated quality score (0-100)
    pub score: Option<f64>,
    pub resources: ResourceBreakdown,
    #[serde(default)]
    pub network: Option<NetworkInfo>,
    pub long_tasks: u64,
}

impl CsvRecord for PerformanceReport {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "timestamp",
            "page",
            "lcp",
            "fid",
            "cls",
            "fcp",
            "ttfb",
            "tti",
            "tbt",
            "score",
            "resource_count",
            "resource_bytes",
            "long_tasks",
            "effective_type",
        ]
    }

    fn row(&self) -> Vec<String> {
        let mut row = vec![
            self.id.clone(),
            self.timestamp.to_string(),
            self.page.clone(),
        ];
        row.extend(Metric::ALL.iter().map(|m| opt_cell(self.vitals.get(*m))));
        row.push(self.score.map(|s| format!("{:.1}", s)).unwrap_or_default());
        row.push(self.resources.total_count().to_string());
        row.push(self.resources.total_bytes().to_string());
        row.push(self.long_tasks.to_string());
        row.push(
            self.network
                .as_ref()
                .and_then(|n| n.effective_type.clone())
                .unwrap_or_default(),
        );
        row
    }
}
