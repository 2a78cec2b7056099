//! A/B test definitions and result samples.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::clock::Timestamp;

/// One treatment arm of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Share of traffic in percent (0-100)
    #[validate(range(min = 0.0, max = 100.0))]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// An A/B test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AbTest {
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[validate(nested)]
    pub variants: Vec<Variant>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    #[serde(default)]
    pub end_date: Option<Timestamp>,
    /// Metric names this test reports on
    #[serde(default)]
    pub metrics: Vec<String>,
}

impl AbTest {
    /// Whether the test accepts assignments at `now`.
    pub fn is_running(&self, now: Timestamp) -> bool {
        if !self.active {
            return false;
        }
        if self.start_date.is_some_and(|start| now < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| now > end) {
            return false;
        }
        true
    }

    /// Sum of weights over enabled variants.
    pub fn enabled_weight(&self) -> f64 {
        self.variants
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.weight)
            .sum()
    }
}

/// An immutable metric sample for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTestResult {
    pub test_id: String,
    pub variant_id: String,
    pub metric: String,
    pub value: f64,
    pub timestamp: Timestamp,
    pub session_id: String,
}
