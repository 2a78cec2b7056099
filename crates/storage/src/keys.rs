//! Logical storage key names.
//!
//! Each is prefixed with the gateway namespace when written.

pub const EVENTS: &str = "events";
pub const SESSIONS: &str = "sessions";
pub const CURRENT_SESSION: &str = "current_session";
pub const AB_ASSIGNMENTS: &str = "ab_assignments";
pub const AB_RESULTS: &str = "ab_results";
pub const PERFORMANCE_REPORTS: &str = "performance_reports";
pub const GOALS: &str = "goals";
pub const FUNNELS: &str = "funnels";
pub const PROFESSIONAL_METRICS: &str = "professional_metrics";
pub const REALTIME_METRICS: &str = "realtime_metrics";
pub const BROADCAST: &str = "broadcast";

/// Prefix shared by all per-page heatmap keys.
pub const HEATMAP_PREFIX: &str = "heatmap:";

/// Key holding the heatmap points of one page.
pub fn heatmap(page: &str) -> String {
    format!("{}{}", HEATMAP_PREFIX, page)
}
