//! Session handling types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Timestamp;
use crate::events::SessionEvent;
use crate::heatmap::HeatmapPoint;

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A sampled pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MousePoint {
    pub x: f64,
    pub y: f64,
    pub timestamp: Timestamp,
}

/// Scroll behaviour over a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollSummary {
    /// Deepest scroll depth reached (0-100)
    pub max_depth: f64,
    /// Most recent scroll depth (0-100)
    pub current_depth: f64,
    /// Milestones reached, with the time they were first hit
    pub milestones: Vec<ScrollMilestone>,
}

/// A scroll depth milestone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMilestone {
    pub percent: u8,
    pub timestamp: Timestamp,
}

/// Recorder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Recording,
    Paused,
    Ended,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitType {
    Navigation,
    Close,
    Timeout,
    Hidden,
}

impl ExitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Close => "close",
            Self::Timeout => "timeout",
            Self::Hidden => "hidden",
        }
    }
}

/// One continuous visit, from activation to termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID
    pub id: Uuid,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    /// Page path where the session started
    pub page: String,
    pub user_agent: String,
    pub viewport: Viewport,
    /// Ordered captured events
    pub events: Vec<SessionEvent>,
    /// Click points captured during this session
    pub heatmap_points: Vec<HeatmapPoint>,
    pub scroll: ScrollSummary,
    pub mouse_trajectory: Vec<MousePoint>,
    /// Wall-clock duration (ms); equals `end_time - start_time` once ended
    pub duration: i64,
    /// Time spent recording, excluding paused intervals (ms)
    pub active_time: i64,
    pub state: SessionState,
    pub exit_type: Option<ExitType>,
    /// Last time any activity was captured
    pub last_activity: Timestamp,
}

impl Session {
    /// Creates a new recording session.
    pub fn new(
        page: impl Into<String>,
        user_agent: impl Into<String>,
        viewport: Viewport,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time: now,
            end_time: None,
            page: page.into(),
            user_agent: user_agent.into(),
            viewport,
            events: Vec::new(),
            heatmap_points: Vec::new(),
            scroll: ScrollSummary::default(),
            mouse_trajectory: Vec::new(),
            duration: 0,
            active_time: 0,
            state: SessionState::Recording,
            exit_type: None,
            last_activity: now,
        }
    }

    /// Checks if the session has been idle longer than `timeout_ms`.
    pub fn is_timed_out(&self, now: Timestamp, timeout_ms: i64) -> bool {
        self.state != SessionState::Ended && now - self.last_activity > timeout_ms
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }

    /// Number of click events in the session.
    pub fn click_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind() == crate::events::EventKind::Click)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_recording() {
        let session = Session::new("/", "test-agent", Viewport::default(), 100);
        assert_eq!(session.state, SessionState::Recording);
        assert_eq!(session.duration, 0);
        assert!(session.end_time.is_none());
    }

    #[test]
    fn test_timeout_detection() {
        let session = Session::new("/", "ua", Viewport::default(), 0);
        assert!(!session.is_timed_out(1_000, 5_000));
        assert!(session.is_timed_out(5_001, 5_000));
    }

    #[test]
    fn test_serializes_camel_case() {
        let session = Session::new("/about", "ua", Viewport { width: 800, height: 600 }, 1);
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("startTime").is_some());
        assert!(json.get("mouseTrajectory").is_some());
        assert_eq!(json["state"], "recording");
    }
}
