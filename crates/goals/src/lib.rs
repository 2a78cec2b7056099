//! Goal tracking for the analytics engine.
//!
//! [`GoalOrchestrator`] turns typed tracking calls into form statistics,
//! goal progress, funnel counts and professional engagement metrics.

pub mod forms;
pub mod funnel;
pub mod orchestrator;
pub mod professional;
pub mod window;

pub use forms::{FormAction, FormStats};
pub use funnel::{Funnel, FunnelDefinition, FunnelStage};
pub use orchestrator::{GoalOrchestrator, GoalsConfig};
pub use professional::{GameStats, ProfessionalMetrics, ProjectStats};
pub use window::window_start;
