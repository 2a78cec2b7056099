//! Variant assignment and result recording.

use engine_core::limits::{trim_to_cap, MAX_AB_ASSIGNMENTS, MAX_AB_RESULTS};
use engine_core::{AbTest, AbTestResult, Error, Result, SharedClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use storage::{keys, PersistenceGateway};
use tracing::{debug, info, warn};
use validator::Validate;

/// Tests known at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentsConfig {
    #[serde(default)]
    pub tests: Vec<AbTest>,
    /// Fixed seed for the assignment draw; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Cached outcome for one visitor in one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub test_id: String,
    pub session_id: String,
    /// `None` marks a visitor excluded from the test
    pub variant_id: Option<String>,
}

impl Assignment {
    fn matches(&self, test_id: &str, session_id: &str) -> bool {
        self.test_id == test_id && self.session_id == session_id
    }
}

/// Assigns visitors to variants.
///
/// A draw in `[0, 100)` is compared against the running sum of enabled
/// variant weights in declared order; the first variant whose cumulative
/// weight reaches the draw wins. Draws above the total leave the visitor
/// out of the test. Either outcome is cached and persisted per
/// test and session, so a visitor is never re-rolled while the entry is
/// kept. The cache holds the newest [`MAX_AB_ASSIGNMENTS`] outcomes.
pub struct AbTestCoordinator {
    gateway: PersistenceGateway,
    clock: SharedClock,
    rng: StdRng,
    tests: Vec<AbTest>,
    /// Oldest first
    assignments: Vec<Assignment>,
    results: Vec<AbTestResult>,
}

impl AbTestCoordinator {
    pub fn new(gateway: PersistenceGateway, clock: SharedClock) -> Self {
        Self::with_rng(gateway, clock, StdRng::from_os_rng())
    }

    /// Builds a coordinator with every configured test registered.
    pub fn from_config(
        config: &ExperimentsConfig,
        gateway: PersistenceGateway,
        clock: SharedClock,
    ) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut coordinator = Self::with_rng(gateway, clock, rng);
        for test in &config.tests {
            coordinator.register(test.clone())?;
        }
        Ok(coordinator)
    }

    pub fn with_rng(gateway: PersistenceGateway, clock: SharedClock, rng: StdRng) -> Self {
        Self {
            gateway,
            clock,
            rng,
            tests: Vec::new(),
            assignments: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Restores persisted assignments and results.
    pub fn load(&mut self) {
        self.assignments = self.gateway.load(keys::AB_ASSIGNMENTS);
        trim_to_cap(&mut self.assignments, MAX_AB_ASSIGNMENTS);
        self.results = self.gateway.load(keys::AB_RESULTS);
        debug!(
            assignments = self.assignments.len(),
            results = self.results.len(),
            "Loaded experiment data"
        );
    }

    /// Adds or replaces a test definition.
    pub fn register(&mut self, test: AbTest) -> Result<()> {
        test.validate()?;
        if test.enabled_weight() > 100.0 {
            warn!(
                test_id = %test.id,
                weight = test.enabled_weight(),
                "Variant weights exceed 100, later variants are unreachable"
            );
        }
        info!(test_id = %test.id, variants = test.variants.len(), "Registered A/B test");
        match self.tests.iter_mut().find(|t| t.id == test.id) {
            Some(existing) => *existing = test,
            None => self.tests.push(test),
        }
        Ok(())
    }

    pub fn test(&self, test_id: &str) -> Option<&AbTest> {
        self.tests.iter().find(|t| t.id == test_id)
    }

    pub fn tests(&self) -> &[AbTest] {
        &self.tests
    }

    /// Returns the cached outcome for a visitor, if any. The inner `None`
    /// means the visitor was excluded.
    pub fn assignment(&self, test_id: &str, session_id: &str) -> Option<Option<&str>> {
        self.assignments
            .iter()
            .rev()
            .find(|a| a.matches(test_id, session_id))
            .map(|a| a.variant_id.as_deref())
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Returns the variant for this visitor, drawing one on first call.
    ///
    /// Unknown, inactive and out-of-window tests assign nothing and cache
    /// nothing.
    pub fn assign_variant(&mut self, test_id: &str, session_id: &str) -> Option<String> {
        if let Some(cached) = self.assignment(test_id, session_id) {
            return cached.map(str::to_string);
        }

        let now = self.clock.now();
        let test = match self.tests.iter().find(|t| t.id == test_id) {
            Some(test) if test.is_running(now) => test,
            Some(_) => {
                debug!(test_id = %test_id, "Test not running, no assignment");
                return None;
            }
            None => {
                debug!(test_id = %test_id, "Unknown test, no assignment");
                return None;
            }
        };

        let draw = self.rng.random_range(0.0..100.0);
        let outcome = pick_variant(test, draw);
        debug!(
            test_id = %test_id,
            draw,
            variant = outcome.as_deref().unwrap_or("excluded"),
            "Assigned visitor"
        );

        self.assignments.push(Assignment {
            test_id: test_id.to_string(),
            session_id: session_id.to_string(),
            variant_id: outcome.clone(),
        });
        if let Err(e) =
            self.gateway
                .save_capped(keys::AB_ASSIGNMENTS, &mut self.assignments, MAX_AB_ASSIGNMENTS)
        {
            warn!(error = %e, "Failed to persist A/B assignments");
        }
        outcome
    }

    /// Appends a metric sample for a variant.
    pub fn record_result(
        &mut self,
        test_id: &str,
        variant_id: &str,
        metric: &str,
        value: f64,
        session_id: &str,
    ) -> Result<()> {
        let test = self
            .test(test_id)
            .ok_or_else(|| Error::UnknownTest(test_id.to_string()))?;
        if !test.variants.iter().any(|v| v.id == variant_id) {
            return Err(Error::validation(format!(
                "variant {} is not part of test {}",
                variant_id, test_id
            )));
        }
        if metric.is_empty() || !value.is_finite() {
            return Err(Error::validation("result needs a metric name and a finite value"));
        }

        let result = AbTestResult {
            test_id: test_id.to_string(),
            variant_id: variant_id.to_string(),
            metric: metric.to_string(),
            value,
            timestamp: self.clock.now(),
            session_id: session_id.to_string(),
        };
        self.results.push(result);
        self.gateway
            .save_capped(keys::AB_RESULTS, &mut self.results, MAX_AB_RESULTS)?;
        Ok(())
    }

    /// Samples recorded for `test_id`, oldest first.
    pub fn results(&self, test_id: &str) -> Vec<AbTestResult> {
        self.results
            .iter()
            .filter(|r| r.test_id == test_id)
            .cloned()
            .collect()
    }

    pub fn all_results(&self) -> &[AbTestResult] {
        &self.results
    }
}

/// Walks enabled variants accumulating weight; returns the first one whose
/// cumulative weight is at least `draw`.
///
/// Zero-weight variants are never picked, even for a draw of exactly `0.0`
/// where a plain cumulative walk would select a leading zero-weight entry.
/// That draw has negligible probability, so shares are unaffected.
pub fn pick_variant(test: &AbTest, draw: f64) -> Option<String> {
    let mut cumulative = 0.0;
    for variant in test.variants.iter().filter(|v| v.enabled && v.weight > 0.0) {
        cumulative += variant.weight;
        if cumulative >= draw {
            return Some(variant.id.clone());
        }
    }
    None
}
