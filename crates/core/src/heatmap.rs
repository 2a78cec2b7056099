//! Heatmap point types.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::limits::{HEATMAP_BASE_INTENSITY, HEATMAP_INTENSITY_STEP};

/// Interaction aggregated into a heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Click,
    Hover,
    Scroll,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Hover => "hover",
            Self::Scroll => "scroll",
        }
    }
}

/// Aggregated interaction density at one grid cell of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapPoint {
    pub page: String,
    /// Grid cell column
    pub cell_x: i64,
    /// Grid cell row
    pub cell_y: i64,
    pub element: String,
    pub element_type: String,
    pub interaction: InteractionType,
    pub count: u64,
    pub intensity: f64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

impl HeatmapPoint {
    /// Returns true if `other` lands on the same aggregation key.
    pub fn same_key(&self, cell_x: i64, cell_y: i64, element: &str, interaction: InteractionType) -> bool {
        self.cell_x == cell_x
            && self.cell_y == cell_y
            && self.interaction == interaction
            && self.element == element
    }
}

/// Intensity of a point hit `count` times: `min(0.3 + 0.1 * (count - 1), 1.0)`.
pub fn intensity_for(count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (HEATMAP_BASE_INTENSITY + HEATMAP_INTENSITY_STEP * (count - 1) as f64).min(1.0)
}
