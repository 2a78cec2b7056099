//! Business goal types.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// Kind of outcome a goal counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    FormSubmission,
    ResumeDownload,
    SocialClick,
    ProjectView,
    GameCompletion,
    PageView,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormSubmission => "form_submission",
            Self::ResumeDownload => "resume_download",
            Self::SocialClick => "social_click",
            Self::ProjectView => "project_view",
            Self::GameCompletion => "game_completion",
            Self::PageView => "page_view",
        }
    }
}

/// Window over which goal progress accumulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    #[default]
    AllTime,
}

/// A tracked business outcome with a numeric target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub target: u64,
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Start of the current timeframe window
    #[serde(default)]
    pub window_start: Option<Timestamp>,
    /// Set once the target is reached within the current window
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
}

fn default_true() -> bool {
    true
}

impl Goal {
    pub fn new(id: impl Into<String>, goal_type: GoalType, target: u64, timeframe: Timeframe) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            goal_type,
            target,
            current: 0,
            timeframe,
            active: true,
            window_start: None,
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.target
    }

    /// Progress towards the target (0.0-1.0).
    pub fn progress(&self) -> f64 {
        if self.target == 0 {
            return 1.0;
        }
        (self.current as f64 / self.target as f64).min(1.0)
    }
}

/// Published when a goal reaches its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCompletion {
    pub goal_id: String,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub detail: serde_json::Value,
    pub value: u64,
    pub timestamp: Timestamp,
}
