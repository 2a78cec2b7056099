//! Test fixtures and input generators.

use api::EngineConfig;
use capture::{DomEvent, ElementInfo};
use engine_core::{AbTest, Goal, GoalType, Timeframe, Variant};
use performance::PerformanceEntry;

/// Clock value every test context starts at (2024-01-01T00:00:00Z).
pub const START_TIME: i64 = 1_704_067_200_000;

/// Default config with synthetic traffic switched off.
pub fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.transport.synthetic_interval_ms = 0;
    config
}

pub fn click_at(x: f64, y: f64, id: &str) -> DomEvent {
    DomEvent::Click {
        x,
        y,
        button: 0,
        element: ElementInfo::new("button").with_id(id),
    }
}

pub fn scroll_to(scroll_y: f64) -> DomEvent {
    DomEvent::Scroll {
        scroll_y,
        viewport_height: 800.0,
        document_height: 4000.0,
    }
}

pub fn pointer_at(x: f64, y: f64) -> DomEvent {
    DomEvent::PointerMove { x, y }
}

/// A running test with the given `(variant, weight)` pairs.
pub fn ab_test(id: &str, variants: &[(&str, f64)]) -> AbTest {
    AbTest {
        id: id.to_string(),
        name: format!("{} test", id),
        variants: variants
            .iter()
            .map(|(variant, weight)| Variant {
                id: variant.to_string(),
                name: String::new(),
                weight: *weight,
                enabled: true,
            })
            .collect(),
        active: true,
        start_date: None,
        end_date: None,
        metrics: vec!["conversion".to_string()],
    }
}

pub fn goal(id: &str, goal_type: GoalType, target: u64) -> Goal {
    Goal::new(id, goal_type, target, Timeframe::AllTime)
}

pub fn lcp(value: f64) -> PerformanceEntry {
    PerformanceEntry::LargestContentfulPaint {
        start_time: value,
        size: 0,
    }
}
