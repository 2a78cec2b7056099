//! Performance metric, budget and alert types.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// A tracked runtime performance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    /// Largest Contentful Paint (ms)
    Lcp,
    /// First Input Delay (ms)
    Fid,
    /// Cumulative Layout Shift (unitless)
    Cls,
    /// First Contentful Paint (ms)
    Fcp,
    /// Time to First Byte (ms)
    Ttfb,
    /// Time to Interactive (ms)
    Tti,
    /// Total Blocking Time (ms)
    Tbt,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Lcp,
        Metric::Fid,
        Metric::Cls,
        Metric::Fcp,
        Metric::Ttfb,
        Metric::Tti,
        Metric::Tbt,
    ];

    /// The five Core Web Vitals.
    pub const CORE: [Metric; 5] = [Metric::Lcp, Metric::Fid, Metric::Cls, Metric::Fcp, Metric::Ttfb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lcp => "LCP",
            Self::Fid => "FID",
            Self::Cls => "CLS",
            Self::Fcp => "FCP",
            Self::Ttfb => "TTFB",
            Self::Tti => "TTI",
            Self::Tbt => "TBT",
        }
    }
}

/// Warning/error thresholds for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warning: f64,
    pub error: f64,
}

impl Threshold {
    pub const fn new(warning: f64, error: f64) -> Self {
        Self { warning, error }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A budget violation. Published, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAlert {
    pub metric: Metric,
    pub value: f64,
    /// The threshold that was crossed
    pub threshold: f64,
    pub severity: Severity,
    pub page: String,
    pub timestamp: Timestamp,
}

/// Current values of all tracked metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebVitals {
    pub lcp: Option<f64>,
    pub fid: Option<f64>,
    pub cls: Option<f64>,
    pub fcp: Option<f64>,
    pub ttfb: Option<f64>,
    pub tti: Option<f64>,
    pub tbt: Option<f64>,
}

impl WebVitals {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Lcp => self.lcp,
            Metric::Fid => self.fid,
            Metric::Cls => self.cls,
            Metric::Fcp => self.fcp,
            Metric::Ttfb => self.ttfb,
            Metric::Tti => self.tti,
            Metric::Tbt => self.tbt,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Lcp => &mut self.lcp,
            Metric::Fid => &mut self.fid,
            Metric::Cls => &mut self.cls,
            Metric::Fcp => &mut self.fcp,
            Metric::Ttfb => &mut self.ttfb,
            Metric::Tti => &mut self.tti,
            Metric::Tbt => &mut self.tbt,
        };
        *slot = Some(value);
    }
}
