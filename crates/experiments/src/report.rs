//! Per-variant summaries of recorded results.
//!
//! The confidence figure is a heuristic: a two-proportion z statistic
//! against the first variant, mapped through a logistic approximation of
//! the normal CDF. Good enough for a dashboard, not for a decision.

use engine_core::{AbTest, AbTestResult, Timestamp};
use serde::{Deserialize, Serialize};

/// Scale factor of the logistic approximation to the normal CDF.
const LOGISTIC_SCALE: f64 = 1.702;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantReport {
    pub variant_id: String,
    pub samples: usize,
    pub mean: f64,
    /// Share of samples with a positive value
    pub conversion_rate: f64,
    /// Confidence that this variant differs from the control; `None` for the
    /// control itself or when either side has no samples
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub test_id: String,
    pub metric: String,
    pub variants: Vec<VariantReport>,
    pub generated_at: Timestamp,
}

fn summarize(variant_id: &str, values: &[f64]) -> VariantReport {
    let samples = values.len();
    let (mean, conversion_rate) = if samples == 0 {
        (0.0, 0.0)
    } else {
        let n = samples as f64;
        let conversions = values.iter().filter(|v| **v > 0.0).count() as f64;
        (values.iter().sum::<f64>() / n, conversions / n)
    };
    VariantReport {
        variant_id: variant_id.to_string(),
        samples,
        mean,
        conversion_rate,
        confidence: None,
    }
}

/// Two-sided confidence that two conversion rates differ.
pub fn confidence(control: &VariantReport, candidate: &VariantReport) -> Option<f64> {
    if control.samples == 0 || candidate.samples == 0 {
        return None;
    }
    let n1 = control.samples as f64;
    let n2 = candidate.samples as f64;
    let pooled = (control.conversion_rate * n1 + candidate.conversion_rate * n2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 {
        return Some(0.0);
    }
    let z = (candidate.conversion_rate - control.conversion_rate).abs() / se;
    let cdf = 1.0 / (1.0 + (-LOGISTIC_SCALE * z).exp());
    Some(2.0 * cdf - 1.0)
}

/// Summarizes `results` for one metric, variants in declared order. The
/// first variant is the control.
pub fn build_report(
    test: &AbTest,
    results: &[AbTestResult],
    metric: &str,
    now: Timestamp,
) -> TestReport {
    let mut variants: Vec<VariantReport> = test
        .variants
        .iter()
        .map(|variant| {
            let values: Vec<f64> = results
                .iter()
                .filter(|r| r.test_id == test.id && r.variant_id == variant.id && r.metric == metric)
                .map(|r| r.value)
                .collect();
            summarize(&variant.id, &values)
        })
        .collect();

    if let Some((control, rest)) = variants.split_first_mut() {
        for candidate in rest {
            candidate.confidence = confidence(control, candidate);
        }
    }

    TestReport {
        test_id: test.id.clone(),
        metric: metric.to_string(),
        variants,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Variant;

    fn two_arm() -> AbTest {
        AbTest {
            id: "cta".into(),
            name: String::new(),
            variants: vec![
                Variant { id: "control".into(), name: String::new(), weight: 50.0, enabled: true },
                Variant { id: "bold".into(), name: String::new(), weight: 50.0, enabled: true },
            ],
            active: true,
            start_date: None,
            end_date: None,
            metrics: vec![],
        }
    }

    fn samples(variant: &str, converted: usize, total: usize) -> Vec<AbTestResult> {
        (0..total)
            .map(|i| AbTestResult {
                test_id: "cta".into(),
                variant_id: variant.into(),
                metric: "signup".into(),
                value: if i < converted { 1.0 } else { 0.0 },
                timestamp: i as i64,
                session_id: format!("{}-{}", variant, i),
            })
            .collect()
    }

    #[test]
    fn test_report_counts_and_rates() {
        let mut results = samples("control", 10, 100);
        results.extend(samples("bold", 20, 100));
        let report = build_report(&two_arm(), &results, "signup", 0);

        assert_eq!(report.variants[0].samples, 100);
        assert!((report.variants[0].conversion_rate - 0.1).abs() < 1e-9);
        assert!((report.variants[1].mean - 0.2).abs() < 1e-9);
        assert_eq!(report.variants[0].confidence, None);

        let confidence = report.variants[1].confidence.unwrap();
        assert!(confidence > 0.8 && confidence < 1.0, "confidence {}", confidence);
    }

    #[test]
    fn test_identical_rates_have_no_confidence() {
        let mut results = samples("control", 10, 50);
        results.extend(samples("bold", 10, 50));
        let report = build_report(&two_arm(), &results, "signup", 0);
        assert!(report.variants[1].confidence.unwrap() < 1e-9);
    }

    #[test]
    fn test_missing_samples_yield_none() {
        let results = samples("control", 5, 10);
        let report = build_report(&two_arm(), &results, "signup", 0);
        assert_eq!(report.variants[1].samples, 0);
        assert_eq!(report.variants[1].confidence, None);
    }
}
