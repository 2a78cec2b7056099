//! Engine configuration.

use capture::CaptureConfig;
use engine_core::Viewport;
use experiments::ExperimentsConfig;
use goals::GoalsConfig;
use performance::PerformanceConfig;
use serde::{Deserialize, Serialize};
use storage::StorageConfig;
use transport::TransportConfig;
use worker::WorkerConfig;

/// Everything needed to assemble an [`crate::AnalyticsEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page the first session starts on
    #[serde(default = "default_page")]
    pub page: String,
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub experiments: ExperimentsConfig,
    #[serde(default)]
    pub goals: GoalsConfig,
}

fn default_page() -> String {
    "/".to_string()
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 800,
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page: default_page(),
            viewport: default_viewport(),
            storage: StorageConfig::default(),
            transport: TransportConfig::default(),
            capture: CaptureConfig::default(),
            performance: PerformanceConfig::default(),
            worker: WorkerConfig::default(),
            experiments: ExperimentsConfig::default(),
            goals: GoalsConfig::default(),
        }
    }
}
