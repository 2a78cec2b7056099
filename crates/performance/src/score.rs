//! Estimated page quality score.
//!
//! Each core vital contributes a penalty that grows linearly from zero at
//! its "good" bound to its full weight at its "poor" bound. The score is
//! 100 minus the weighted penalties of the vitals that are known, rescaled
//! to the weight actually observed.

use engine_core::{Metric, WebVitals};

/// (metric, weight, good bound, poor bound)
const SCORING: [(Metric, f64, f64, f64); 5] = [
    (Metric::Lcp, 0.30, 2500.0, 4000.0),
    (Metric::Fid, 0.20, 100.0, 300.0),
    (Metric::Cls, 0.20, 0.1, 0.25),
    (Metric::Fcp, 0.15, 1800.0, 3000.0),
    (Metric::Ttfb, 0.15, 800.0, 1800.0),
];

fn penalty(value: f64, good: f64, poor: f64) -> f64 {
    if value <= good {
        0.0
    } else if value >= poor {
        1.0
    } else {
        (value - good) / (poor - good)
    }
}

/// Score in `[0, 100]`, or `None` when no core vital has been measured.
pub fn quality_score(vitals: &WebVitals) -> Option<f64> {
    let mut weight_seen = 0.0;
    let mut weighted_penalty = 0.0;
    for (metric, weight, good, poor) in SCORING {
        if let Some(value) = vitals.get(metric) {
            weight_seen += weight;
            weighted_penalty += weight * penalty(value, good, poor);
        }
    }
    if weight_seen == 0.0 {
        return None;
    }
    Some((100.0 * (1.0 - weighted_penalty / weight_seen)).clamp(0.0, 100.0))
}
