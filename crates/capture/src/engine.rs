//! Behavior capture engine.
//!
//! Turns host DOM events into session events. Owns exactly one active
//! session, the heatmap aggregator and the throttles. Nothing is published;
//! session data is pull-only.

use engine_core::limits::{POINTER_THROTTLE_MS, SCROLL_THROTTLE_MS, SESSION_TIMEOUT_MS};
use engine_core::{
    ClickData, EventPayload, ExitType, InputData, InteractionType, KeypressData, Modifiers,
    MousePoint, NavigationData, ResizeData, Result, ScrollData, ScrollDirection, Session,
    SessionEvent, SharedClock, Timestamp, Viewport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::PersistenceGateway;
use telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::element::ElementInfo;
use crate::heatmap::{HeatmapAggregator, HeatmapConfig};
use crate::recorder::{RecorderConfig, RecorderState, ReplayFrame, SessionRecorder};
use crate::throttle::Throttle;

/// Capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: i64,
    #[serde(default = "default_pointer_throttle_ms")]
    pub pointer_throttle_ms: i64,
    /// Inactivity before a session ends with `timeout`
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: i64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

fn default_scroll_throttle_ms() -> i64 {
    SCROLL_THROTTLE_MS
}

fn default_pointer_throttle_ms() -> i64 {
    POINTER_THROTTLE_MS
}

fn default_session_timeout_ms() -> i64 {
    SESSION_TIMEOUT_MS
}

fn default_user_agent() -> String {
    "unknown".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            scroll_throttle_ms: default_scroll_throttle_ms(),
            pointer_throttle_ms: default_pointer_throttle_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            user_agent: default_user_agent(),
            heatmap: HeatmapConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

/// Input from the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomEvent {
    Click {
        x: f64,
        y: f64,
        #[serde(default)]
        button: u8,
        element: ElementInfo,
    },
    Scroll {
        scroll_y: f64,
        viewport_height: f64,
        document_height: f64,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    Focus {
        element: ElementInfo,
    },
    Blur {
        element: ElementInfo,
    },
    /// `key` is only inspected for printability and never stored.
    Keypress {
        code: String,
        #[serde(default)]
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
        #[serde(default)]
        element: Option<ElementInfo>,
    },
    /// `value` is only measured and never stored.
    Input {
        element: ElementInfo,
        #[serde(default)]
        field_type: String,
        #[serde(default)]
        value: String,
    },
    Resize {
        width: u32,
        height: u32,
    },
    Navigation {
        to: String,
    },
    PageHidden,
    PageVisible,
    /// Page is going away; `navigating` when leaving for another document.
    Unload {
        #[serde(default)]
        navigating: bool,
    },
}

/// What happened to one [`DomEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured,
    Throttled,
    /// Not applicable in the current state (inactive engine, paused page)
    Ignored,
    /// Failed validation
    Rejected,
}

/// Scroll depth as a percentage of the scrollable distance.
pub fn scroll_depth(scroll_y: f64, viewport_height: f64, document_height: f64) -> f64 {
    let scrollable = document_height - viewport_height;
    if scrollable <= 0.0 {
        return 100.0;
    }
    (scroll_y.max(0.0) / scrollable * 100.0).clamp(0.0, 100.0)
}

/// Captures interactions into the active session.
pub struct CaptureEngine {
    config: CaptureConfig,
    clock: SharedClock,
    recorder: SessionRecorder,
    heatmap: HeatmapAggregator,
    scroll_throttle: Throttle,
    pointer_throttle: Throttle,
    page: String,
    viewport: Viewport,
    last_scroll_y: f64,
    active: bool,
    metrics: Option<Arc<Metrics>>,
}

impl CaptureEngine {
    pub fn new(config: CaptureConfig, gateway: PersistenceGateway, clock: SharedClock) -> Self {
        Self {
            recorder: SessionRecorder::new(config.recorder.clone(), gateway.clone()),
            heatmap: HeatmapAggregator::new(config.heatmap.clone(), gateway),
            scroll_throttle: Throttle::new(config.scroll_throttle_ms),
            pointer_throttle: Throttle::new(config.pointer_throttle_ms),
            config,
            clock,
            page: "/".to_string(),
            viewport: Viewport::default(),
            last_scroll_y: 0.0,
            active: false,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    /// Loads stored data and opens the first session.
    pub fn init(&mut self, page: &str, viewport: Viewport) -> Result<()> {
        if self.active {
            debug!("Capture already initialized");
            return Ok(());
        }
        self.heatmap.load();
        self.recorder.load();
        self.page = page.to_string();
        self.viewport = viewport;
        self.recorder
            .start(page, &self.config.user_agent, viewport, self.clock.now())?;
        self.active = true;
        info!(page = %page, "Capture engine initialized");
        Ok(())
    }

    /// Ends the session and flushes. Later capture calls are no-ops.
    pub fn destroy(&mut self) {
        if !self.active {
            return;
        }
        let exit = match self.recorder.state() {
            RecorderState::Paused => Some(ExitType::Hidden),
            RecorderState::Recording => Some(ExitType::Close),
            _ => None,
        };
        if let Some(exit) = exit {
            self.end_session(exit);
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "Final capture flush failed");
        }
        self.active = false;
        info!("Capture engine destroyed");
    }

    fn count(&self, outcome: CaptureOutcome) -> CaptureOutcome {
        if let Some(metrics) = &self.metrics {
            match outcome {
                CaptureOutcome::Captured => metrics.events_captured.inc(),
                CaptureOutcome::Throttled => metrics.events_throttled.inc(),
                CaptureOutcome::Rejected => metrics.events_rejected.inc(),
                CaptureOutcome::Ignored => {}
            }
        }
        outcome
    }

    fn end_session(&mut self, exit: ExitType) {
        match self.recorder.end(exit, self.clock.now()) {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.sessions_ended.inc();
                }
            }
            Err(e) => debug!(error = %e, "No session to end"),
        }
    }

    /// Makes sure a session is recording before capturing activity. Starts
    /// a fresh one after a timeout or an earlier end.
    fn ensure_session(&mut self, now: Timestamp) -> bool {
        let timed_out = self
            .recorder
            .current()
            .is_some_and(|s| s.is_timed_out(now, self.config.session_timeout_ms));
        if timed_out && self.recorder.is_recording() {
            info!("Session timed out, starting a new one");
            self.end_session(ExitType::Timeout);
        }

        match self.recorder.state() {
            RecorderState::Recording => true,
            RecorderState::Paused => false,
            RecorderState::Idle | RecorderState::Ended => {
                self.scroll_throttle.reset();
                self.pointer_throttle.reset();
                self.recorder
                    .start(&self.page, &self.config.user_agent, self.viewport, now)
                    .is_ok()
            }
        }
    }

    fn append(&mut self, event: SessionEvent) -> CaptureOutcome {
        if let Err(e) = event.validate() {
            warn!(kind = event.kind().as_str(), error = %e, "Rejected captured event");
            return self.count(CaptureOutcome::Rejected);
        }
        match self.recorder.record_event(event) {
            Ok(()) => self.count(CaptureOutcome::Captured),
            Err(e) => {
                debug!(error = %e, "Event not recorded");
                CaptureOutcome::Ignored
            }
        }
    }

    /// Feeds one host event into the engine.
    pub fn handle(&mut self, event: DomEvent) -> CaptureOutcome {
        if !self.active {
            return CaptureOutcome::Ignored;
        }
        let now = self.clock.now();

        match event {
            DomEvent::PageHidden => {
                return match self.recorder.pause(now) {
                    Ok(()) => CaptureOutcome::Captured,
                    Err(_) => CaptureOutcome::Ignored,
                };
            }
            DomEvent::PageVisible => {
                return match self.recorder.resume(now) {
                    Ok(()) => CaptureOutcome::Captured,
                    Err(_) => CaptureOutcome::Ignored,
                };
            }
            DomEvent::Unload { navigating } => {
                if self.recorder.current().is_none() {
                    return CaptureOutcome::Ignored;
                }
                let exit = if navigating {
                    ExitType::Navigation
                } else {
                    ExitType::Close
                };
                self.end_session(exit);
                return CaptureOutcome::Captured;
            }
            _ => {}
        }

        if !self.ensure_session(now) {
            return CaptureOutcome::Ignored;
        }

        match event {
            DomEvent::Click {
                x,
                y,
                button,
                element,
            } => {
                let target = element.target();
                let outcome = self.append(SessionEvent::new(
                    now,
                    Some(target.clone()),
                    EventPayload::Click(ClickData { x, y, button }),
                ));
                if outcome == CaptureOutcome::Captured {
                    let point =
                        self.heatmap
                            .record(&self.page, x, y, &target, InteractionType::Click, now);
                    if let Err(e) = self.recorder.record_heatmap_point(point) {
                        debug!(error = %e, "Heatmap point not mirrored");
                    }
                }
                outcome
            }
            DomEvent::Scroll {
                scroll_y,
                viewport_height,
                document_height,
            } => {
                if !self.scroll_throttle.ready(now) {
                    return self.count(CaptureOutcome::Throttled);
                }
                let depth = scroll_depth(scroll_y, viewport_height, document_height);
                let direction = if scroll_y < self.last_scroll_y {
                    ScrollDirection::Up
                } else {
                    ScrollDirection::Down
                };
                self.last_scroll_y = scroll_y;

                let outcome = self.append(SessionEvent::new(
                    now,
                    None,
                    EventPayload::Scroll(ScrollData {
                        scroll_y: scroll_y.max(0.0),
                        depth_percent: depth,
                        direction,
                    }),
                ));
                if outcome == CaptureOutcome::Captured {
                    match self.recorder.record_scroll(depth, now) {
                        Ok(reached) if !reached.is_empty() => {
                            debug!(milestones = ?reached, "Scroll milestones reached")
                        }
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, "Scroll depth not recorded"),
                    }
                }
                outcome
            }
            DomEvent::PointerMove { x, y } => {
                if !self.pointer_throttle.ready(now) {
                    return self.count(CaptureOutcome::Throttled);
                }
                match self.recorder.record_pointer(MousePoint { x, y, timestamp: now }) {
                    Ok(()) => self.count(CaptureOutcome::Captured),
                    Err(_) => CaptureOutcome::Ignored,
                }
            }
            DomEvent::Focus { element } => {
                self.append(SessionEvent::new(now, Some(element.target()), EventPayload::Focus))
            }
            DomEvent::Blur { element } => {
                self.append(SessionEvent::new(now, Some(element.target()), EventPayload::Blur))
            }
            DomEvent::Keypress {
                code,
                key,
                modifiers,
                element,
            } => {
                let printable = key.chars().count() == 1;
                self.append(SessionEvent::new(
                    now,
                    element.map(|e| e.target()),
                    EventPayload::Keypress(KeypressData {
                        code,
                        modifiers,
                        printable,
                    }),
                ))
            }
            DomEvent::Input {
                element,
                field_type,
                value,
            } => {
                let field_type = if field_type.is_empty() {
                    "text".to_string()
                } else {
                    field_type
                };
                self.append(SessionEvent::new(
                    now,
                    Some(element.target()),
                    EventPayload::Input(InputData {
                        field_type,
                        value_length: value.chars().count(),
                    }),
                ))
            }
            DomEvent::Resize { width, height } => {
                let outcome = self.append(SessionEvent::new(
                    now,
                    None,
                    EventPayload::Resize(ResizeData { width, height }),
                ));
                if outcome == CaptureOutcome::Captured {
                    self.viewport = Viewport { width, height };
                    self.recorder.set_viewport(self.viewport);
                }
                outcome
            }
            DomEvent::Navigation { to } => {
                let from = std::mem::replace(&mut self.page, to.clone());
                let outcome = self.append(SessionEvent::new(
                    now,
                    None,
                    EventPayload::Navigation(NavigationData {
                        from: from.clone(),
                        to,
                    }),
                ));
                if outcome == CaptureOutcome::Rejected {
                    self.page = from;
                } else {
                    self.last_scroll_y = 0.0;
                }
                outcome
            }
            DomEvent::PageHidden | DomEvent::PageVisible | DomEvent::Unload { .. } => {
                CaptureOutcome::Ignored
            }
        }
    }

    /// Ends the session if it has been idle past the timeout. Driven by a
    /// recurring timer.
    pub fn check_timeout(&mut self) -> bool {
        if !self.active || !self.recorder.is_recording() {
            return false;
        }
        let now = self.clock.now();
        let timed_out = self
            .recorder
            .current()
            .is_some_and(|s| s.is_timed_out(now, self.config.session_timeout_ms));
        if timed_out {
            info!("Session idle past timeout");
            self.end_session(ExitType::Timeout);
        }
        timed_out
    }

    /// Persists dirty heatmap pages and the in-progress session.
    pub fn flush(&mut self) -> Result<()> {
        let pages = self.heatmap.flush()?;
        self.recorder.save_current()?;
        debug!(pages, "Capture data flushed");
        Ok(())
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.recorder.current()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.recorder.current().map(|s| s.id)
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn heatmap(&self) -> &HeatmapAggregator {
        &self.heatmap
    }

    pub fn heatmap_mut(&mut self) -> &mut HeatmapAggregator {
        &mut self.heatmap
    }

    pub fn replay(&self, session_id: Uuid, cursor: Timestamp) -> Result<ReplayFrame> {
        self.recorder.replay(session_id, cursor)
    }
}
