//! Performance budgets.

use engine_core::{Metric, Severity, Threshold};
use std::collections::BTreeMap;

/// Warning and error thresholds per metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Budgets {
    thresholds: BTreeMap<Metric, Threshold>,
}

/// Budgets used when nothing is configured.
pub fn default_budgets() -> BTreeMap<Metric, Threshold> {
    BTreeMap::from([
        (Metric::Lcp, Threshold::new(2500.0, 4000.0)),
        (Metric::Fid, Threshold::new(100.0, 300.0)),
        (Metric::Cls, Threshold::new(0.1, 0.25)),
        (Metric::Fcp, Threshold::new(1800.0, 3000.0)),
        (Metric::Ttfb, Threshold::new(800.0, 1800.0)),
        (Metric::Tti, Threshold::new(3800.0, 7300.0)),
        (Metric::Tbt, Threshold::new(200.0, 600.0)),
    ])
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            thresholds: default_budgets(),
        }
    }
}

impl Budgets {
    /// Defaults with `overrides` applied on top.
    pub fn with_overrides(overrides: &BTreeMap<Metric, Threshold>) -> Self {
        let mut budgets = Self::default();
        for (metric, threshold) in overrides {
            budgets.set(*metric, *threshold);
        }
        budgets
    }

    pub fn set(&mut self, metric: Metric, threshold: Threshold) {
        self.thresholds.insert(metric, threshold);
    }

    pub fn get(&self, metric: Metric) -> Option<Threshold> {
        self.thresholds.get(&metric).copied()
    }

    /// Classifies `value`. Values equal to a threshold do not cross it.
    pub fn evaluate(&self, metric: Metric, value: f64) -> Option<(Severity, f64)> {
        let threshold = self.get(metric)?;
        if value > threshold.error {
            Some((Severity::Critical, threshold.error))
        } else if value > threshold.warning {
            Some((Severity::Warning, threshold.warning))
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Metric, &Threshold)> {
        self.thresholds.iter()
    }
}
