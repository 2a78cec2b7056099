//! Ordered conversion funnels.

use serde::{Deserialize, Serialize};

/// Funnel shape as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Step names, matched against tracking event names
    pub steps: Vec<String>,
}

/// Step counts for one funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funnel {
    pub id: String,
    pub name: String,
    pub steps: Vec<String>,
    pub counts: Vec<u64>,
}

/// One stage of a funnel report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStage {
    pub step: String,
    pub count: u64,
    /// Percentage of the previous stage that reached this one; the first
    /// stage is always 100
    pub conversion_rate: f64,
}

impl From<&FunnelDefinition> for Funnel {
    fn from(definition: &FunnelDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            steps: definition.steps.clone(),
            counts: vec![0; definition.steps.len()],
        }
    }
}

impl Funnel {
    /// Counts a step; returns false when the funnel has no such step.
    pub fn record(&mut self, step: &str) -> bool {
        self.counts.resize(self.steps.len(), 0);
        match self.steps.iter().position(|s| s == step) {
            Some(index) => {
                self.counts[index] += 1;
                true
            }
            None => false,
        }
    }

    pub fn stages(&self) -> Vec<FunnelStage> {
        let mut previous: Option<u64> = None;
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let count = self.counts.get(i).copied().unwrap_or(0);
                let conversion_rate = match previous {
                    None => 100.0,
                    Some(0) => 0.0,
                    Some(prev) => count as f64 / prev as f64 * 100.0,
                };
                previous = Some(count);
                FunnelStage {
                    step: step.clone(),
                    count,
                    conversion_rate,
                }
            })
            .collect()
    }
}
