//! Session recording and replay.
//!
//! Lifecycle: `idle -> recording -> {paused <-> recording} -> ended`. An
//! ended session moves into a capped archive; starting again opens a fresh
//! one. Replay filters a session's buffers to a cursor time.

use engine_core::limits::{
    trim_to_cap, MAX_ARCHIVED_SESSIONS, MAX_ARCHIVED_SESSIONS_CEILING, MAX_SESSION_EVENTS,
    MAX_TRAJECTORY_POINTS, SCROLL_MILESTONES,
};
use engine_core::{
    Error, ExitType, HeatmapPoint, MousePoint, Result, ScrollMilestone, Session, SessionEvent,
    SessionState, Timestamp, Viewport,
};
use serde::{Deserialize, Serialize};
use storage::export::{self, opt_cell, CsvRecord, ExportFormat};
use storage::{keys, PersistenceGateway};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_max_archived_sessions")]
    pub max_archived_sessions: usize,
    #[serde(default = "default_max_trajectory_points")]
    pub max_trajectory_points: usize,
    #[serde(default = "default_max_session_events")]
    pub max_session_events: usize,
}

fn default_max_archived_sessions() -> usize {
    MAX_ARCHIVED_SESSIONS
}

fn default_max_trajectory_points() -> usize {
    MAX_TRAJECTORY_POINTS
}

fn default_max_session_events() -> usize {
    MAX_SESSION_EVENTS
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_archived_sessions: default_max_archived_sessions(),
            max_trajectory_points: default_max_trajectory_points(),
            max_session_events: default_max_session_events(),
        }
    }
}

impl RecorderConfig {
    fn archive_cap(&self) -> usize {
        self.max_archived_sessions.min(MAX_ARCHIVED_SESSIONS_CEILING)
    }
}

/// Recorder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Ended,
}

/// Session state reconstructed at a cursor time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    pub session_id: Uuid,
    pub cursor: Timestamp,
    pub events: Vec<SessionEvent>,
    pub trajectory: Vec<MousePoint>,
    /// Scroll depth as of the cursor (0-100)
    pub scroll_depth: f64,
    /// Fraction of the session elapsed at the cursor (0-1)
    pub progress: f64,
}

/// Flattened per-session row for CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub page: String,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    pub duration: i64,
    pub active_time: i64,
    pub event_count: usize,
    pub click_count: usize,
    pub max_scroll_depth: f64,
    pub exit_type: Option<ExitType>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            page: session.page.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            duration: session.duration,
            active_time: session.active_time,
            event_count: session.events.len(),
            click_count: session.click_count(),
            max_scroll_depth: session.scroll.max_depth,
            exit_type: session.exit_type,
        }
    }
}

impl CsvRecord for SessionSummary {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "page",
            "start_time",
            "end_time",
            "duration_ms",
            "active_time_ms",
            "event_count",
            "click_count",
            "max_scroll_depth",
            "exit_type",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.page.clone(),
            self.start_time.to_string(),
            opt_cell(self.end_time.map(|t| t as f64)),
            self.duration.to_string(),
            self.active_time.to_string(),
            self.event_count.to_string(),
            self.click_count.to_string(),
            self.max_scroll_depth.to_string(),
            self.exit_type.map(|e| e.as_str().to_string()).unwrap_or_default(),
        ]
    }
}

/// Owns the active session and the archive of ended ones.
pub struct SessionRecorder {
    config: RecorderConfig,
    gateway: PersistenceGateway,
    state: RecorderState,
    current: Option<Session>,
    /// Start of the current uninterrupted recording stretch
    segment_start: Timestamp,
    archive: Vec<Session>,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig, gateway: PersistenceGateway) -> Self {
        Self {
            config,
            gateway,
            state: RecorderState::Idle,
            current: None,
            segment_start: 0,
            archive: Vec::new(),
        }
    }

    /// Loads the stored archive.
    pub fn load(&mut self) {
        self.archive = self.gateway.load(keys::SESSIONS);
        trim_to_cap(&mut self.archive, self.config.archive_cap());
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn archive(&self) -> &[Session] {
        &self.archive
    }

    fn transition_error(&self, action: &str) -> Error {
        Error::invalid_session(format!("cannot {} while {:?}", action, self.state).to_lowercase())
    }

    fn active_mut(&mut self) -> Result<&mut Session> {
        if self.state != RecorderState::Recording {
            return Err(self.transition_error("record"));
        }
        self.current
            .as_mut()
            .ok_or_else(|| Error::invalid_session("no active session"))
    }

    /// Opens a new session. Allowed from idle or ended.
    pub fn start(
        &mut self,
        page: &str,
        user_agent: &str,
        viewport: Viewport,
        now: Timestamp,
    ) -> Result<&Session> {
        if !matches!(self.state, RecorderState::Idle | RecorderState::Ended) {
            return Err(self.transition_error("start"));
        }

        let session = Session::new(page, user_agent, viewport, now);
        info!(session_id = %session.id, page = %page, "Session started");
        self.segment_start = now;
        self.state = RecorderState::Recording;
        Ok(&*self.current.insert(session))
    }

    /// Freezes the clock without discarding buffers.
    pub fn pause(&mut self, now: Timestamp) -> Result<()> {
        if self.state != RecorderState::Recording {
            return Err(self.transition_error("pause"));
        }
        let segment_start = self.segment_start;
        if let Some(session) = self.current.as_mut() {
            session.active_time += (now - segment_start).max(0);
            session.duration = session.duration.max(now - session.start_time);
            session.state = SessionState::Paused;
        }
        self.state = RecorderState::Paused;
        debug!("Session paused");
        Ok(())
    }

    pub fn resume(&mut self, now: Timestamp) -> Result<()> {
        if self.state != RecorderState::Paused {
            return Err(self.transition_error("resume"));
        }
        if let Some(session) = self.current.as_mut() {
            session.state = SessionState::Recording;
            session.last_activity = session.last_activity.max(now);
        }
        self.segment_start = now;
        self.state = RecorderState::Recording;
        debug!("Session resumed");
        Ok(())
    }

    /// Finalizes the session, archives it and returns it.
    pub fn end(&mut self, exit_type: ExitType, now: Timestamp) -> Result<Session> {
        if !matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            return Err(self.transition_error("end"));
        }
        let mut session = self
            .current
            .take()
            .ok_or_else(|| Error::invalid_session("no active session"))?;

        let end_time = now.max(session.start_time).max(session.start_time + session.duration);
        if self.state == RecorderState::Recording {
            session.active_time += (end_time - self.segment_start).max(0);
        }
        session.end_time = Some(end_time);
        session.duration = end_time - session.start_time;
        session.exit_type = Some(exit_type);
        session.state = SessionState::Ended;
        self.state = RecorderState::Ended;

        info!(
            session_id = %session.id,
            exit = exit_type.as_str(),
            duration_ms = session.duration,
            events = session.events.len(),
            "Session ended"
        );

        self.archive.push(session.clone());
        trim_to_cap(&mut self.archive, self.config.archive_cap());
        if let Err(e) = self.gateway.save(keys::SESSIONS, &self.archive) {
            warn!(error = %e, "Failed to persist session archive");
        }
        if let Err(e) = self.gateway.remove(keys::CURRENT_SESSION) {
            debug!(error = %e, "No current session snapshot to clear");
        }
        Ok(session)
    }

    /// Appends a captured event.
    pub fn record_event(&mut self, event: SessionEvent) -> Result<()> {
        let cap = self.config.max_session_events;
        let session = self.active_mut()?;
        touch(session, event.timestamp);
        session.events.push(event);
        trim_to_cap(&mut session.events, cap);
        Ok(())
    }

    pub fn record_pointer(&mut self, point: MousePoint) -> Result<()> {
        let cap = self.config.max_trajectory_points;
        let session = self.active_mut()?;
        touch(session, point.timestamp);
        session.mouse_trajectory.push(point);
        trim_to_cap(&mut session.mouse_trajectory, cap);
        Ok(())
    }

    /// Mirrors an aggregated heatmap point into the session.
    pub fn record_heatmap_point(&mut self, point: HeatmapPoint) -> Result<()> {
        let session = self.active_mut()?;
        match session.heatmap_points.iter_mut().find(|p| {
            p.page == point.page
                && p.same_key(point.cell_x, point.cell_y, &point.element, point.interaction)
        }) {
            Some(existing) => *existing = point,
            None => session.heatmap_points.push(point),
        }
        Ok(())
    }

    /// Updates scroll depth. Returns milestones reached for the first time.
    pub fn record_scroll(&mut self, depth: f64, now: Timestamp) -> Result<Vec<u8>> {
        let session = self.active_mut()?;
        touch(session, now);
        let scroll = &mut session.scroll;
        scroll.current_depth = depth;
        scroll.max_depth = scroll.max_depth.max(depth);

        let mut reached = Vec::new();
        for milestone in SCROLL_MILESTONES {
            let already = scroll.milestones.iter().any(|m| m.percent == milestone);
            if !already && depth >= f64::from(milestone) {
                scroll.milestones.push(ScrollMilestone {
                    percent: milestone,
                    timestamp: now,
                });
                reached.push(milestone);
            }
        }
        Ok(reached)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if let Some(session) = self.current.as_mut() {
            session.viewport = viewport;
        }
    }

    /// Writes a snapshot of the in-progress session.
    pub fn save_current(&self) -> Result<()> {
        match &self.current {
            Some(session) => self.gateway.save(keys::CURRENT_SESSION, session),
            None => Ok(()),
        }
    }

    fn find(&self, session_id: Uuid) -> Option<&Session> {
        self.current
            .iter()
            .chain(self.archive.iter())
            .find(|s| s.id == session_id)
    }

    /// Reconstructs a session as of `cursor`.
    pub fn replay(&self, session_id: Uuid, cursor: Timestamp) -> Result<ReplayFrame> {
        let session = self
            .find(session_id)
            .ok_or_else(|| Error::invalid_session(format!("unknown session {}", session_id)))?;
        Ok(replay_frame(session, cursor))
    }

    /// Archived sessions plus the active one, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        self.archive.iter().chain(self.current.iter()).cloned().collect()
    }

    /// JSON exports full sessions; CSV exports one summary row per session.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let sessions = self.sessions();
        match format {
            ExportFormat::Json => export::to_json(&sessions),
            ExportFormat::Csv => {
                let summaries: Vec<SessionSummary> = sessions.iter().map(Into::into).collect();
                export::to_csv(&summaries)
            }
        }
    }
}

fn touch(session: &mut Session, now: Timestamp) {
    session.last_activity = session.last_activity.max(now);
    session.duration = session.duration.max(now - session.start_time);
}

/// Filters every buffer of `session` to entries at or before `cursor`.
pub fn replay_frame(session: &Session, cursor: Timestamp) -> ReplayFrame {
    let events: Vec<SessionEvent> = session
        .events
        .iter()
        .filter(|e| e.timestamp <= cursor)
        .cloned()
        .collect();

    let trajectory: Vec<MousePoint> = session
        .mouse_trajectory
        .iter()
        .filter(|p| p.timestamp <= cursor)
        .copied()
        .collect();

    let scroll_depth = events
        .iter()
        .rev()
        .find_map(|e| match &e.payload {
            engine_core::EventPayload::Scroll(data) => Some(data.depth_percent),
            _ => None,
        })
        .unwrap_or(0.0);

    let progress = if session.duration > 0 {
        ((cursor - session.start_time) as f64 / session.duration as f64).clamp(0.0, 1.0)
    } else {
        1.0
    };

    ReplayFrame {
        session_id: session.id,
        cursor,
        events,
        trajectory,
        scroll_depth,
        progress,
    }
}
