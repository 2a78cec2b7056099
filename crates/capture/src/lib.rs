//! Behavior capture for the analytics engine.
//!
//! Host pages feed [`DomEvent`]s into a [`CaptureEngine`], which throttles,
//! validates and records them into the active session and the per-page
//! heatmap.

pub mod element;
pub mod engine;
pub mod heatmap;
pub mod recorder;
pub mod throttle;

pub use element::{element_identifier, ElementInfo};
pub use engine::{scroll_depth, CaptureConfig, CaptureEngine, CaptureOutcome, DomEvent};
pub use heatmap::{HeatmapAggregator, HeatmapConfig, HeatmapQuery};
pub use recorder::{
    replay_frame, RecorderConfig, RecorderState, ReplayFrame, SessionRecorder, SessionSummary,
};
pub use throttle::Throttle;
