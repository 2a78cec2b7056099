//! Size caps and timing limits for the analytics engine.
//!
//! Every persisted list is trimmed to one of these caps after each append.
//! Capping is the only growth bound on the shared store, so keep the values
//! small enough for a browser-sized key-value quota.

// === Storage Caps ===

/// Maximum tracked analytics events kept in the `events` list.
pub const MAX_STORED_EVENTS: usize = 1000;

/// Maximum archived sessions kept by the session recorder.
pub const MAX_ARCHIVED_SESSIONS: usize = 10;

/// Upper bound for any consumer-configured session archive.
pub const MAX_ARCHIVED_SESSIONS_CEILING: usize = 50;

/// Maximum heatmap points kept per page.
pub const MAX_HEATMAP_POINTS_PER_PAGE: usize = 500;

/// Maximum A/B test result samples.
pub const MAX_AB_RESULTS: usize = 500;

/// Maximum cached A/B outcomes, one per test and session. Oldest go first.
pub const MAX_AB_ASSIGNMENTS: usize = 1000;

/// Maximum performance report snapshots.
pub const MAX_PERFORMANCE_REPORTS: usize = 50;

/// Maximum mouse trajectory points per session.
pub const MAX_TRAJECTORY_POINTS: usize = 1000;

/// Maximum events buffered inside a single session.
pub const MAX_SESSION_EVENTS: usize = 5000;

/// Maximum outbound messages queued while the socket is down.
pub const MAX_TRANSPORT_QUEUE: usize = 1000;

// === Throttling ===

/// Minimum interval between captured scroll events (ms).
pub const SCROLL_THROTTLE_MS: i64 = 250;

/// Minimum interval between captured pointer movements (ms).
pub const POINTER_THROTTLE_MS: i64 = 100;

// === Heatmap ===

/// Heatmap grid cell size in pixels.
pub const HEATMAP_GRID_SIZE: f64 = 20.0;

/// Intensity of a freshly created heatmap point.
pub const HEATMAP_BASE_INTENSITY: f64 = 0.3;

/// Intensity added per additional interaction on the same cell.
pub const HEATMAP_INTENSITY_STEP: f64 = 0.1;

// === Sessions ===

/// Session inactivity timeout (30 minutes).
pub const SESSION_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// Scroll depth milestones recorded once per session (percent).
pub const SCROLL_MILESTONES: [u8; 4] = [25, 50, 75, 100];

// === String Field Limits (chars) ===

/// Element identifier max length.
pub const MAX_ELEMENT_ID_LEN: usize = 256;

/// Page path max length.
pub const MAX_PATH_LEN: usize = 2000;

/// User agent string max length.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Trims `items` in place so that at most `cap` of the most recent entries
/// remain, preserving their original order.
pub fn trim_to_cap<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}
