//! Engagement counters for a portfolio site, stored under one key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::forms::FormStats;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub name: String,
    pub views: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub plays: u64,
    pub completions: u64,
    pub total_time_ms: u64,
    pub best_score: Option<f64>,
}

impl GameStats {
    pub fn record(&mut self, completed: bool, time_spent_ms: u64, score: Option<f64>) {
        self.plays += 1;
        if completed {
            self.completions += 1;
        }
        self.total_time_ms += time_spent_ms;
        if let Some(score) = score.filter(|s| s.is_finite()) {
            self.best_score = Some(self.best_score.map_or(score, |best| best.max(score)));
        }
    }

    pub fn completion_rate(&self) -> f64 {
        if self.plays == 0 {
            return 0.0;
        }
        self.completions as f64 / self.plays as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalMetrics {
    /// Downloads per source (e.g. `header`, `footer`)
    pub resume_downloads: BTreeMap<String, u64>,
    /// Clicks per platform
    pub social_clicks: BTreeMap<String, u64>,
    pub project_views: BTreeMap<String, ProjectStats>,
    pub games: BTreeMap<String, GameStats>,
    pub forms: BTreeMap<String, FormStats>,
}

impl ProfessionalMetrics {
    pub fn total_resume_downloads(&self) -> u64 {
        self.resume_downloads.values().sum()
    }

    pub fn total_social_clicks(&self) -> u64 {
        self.social_clicks.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_stats() {
        let mut stats = GameStats::default();
        stats.record(true, 30_000, Some(120.0));
        stats.record(false, 10_000, Some(90.0));
        stats.record(true, 20_000, None);
        assert_eq!(stats.plays, 3);
        assert_eq!(stats.best_score, Some(120.0));
        assert_eq!(stats.total_time_ms, 60_000);
        assert!((stats.completion_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
