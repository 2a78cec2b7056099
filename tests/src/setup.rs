//! Common test setup functions.

use api::{AnalyticsEngine, EngineConfig};
use engine_core::ManualClock;
use std::sync::Arc;
use storage::MemoryStore;

use crate::fixtures::{quiet_config, START_TIME};
use crate::mocks::MockTransport;

/// Test context with an in-memory store, a manual clock and a recording
/// transport.
///
/// The engine runs the same code paths as production; only the transport
/// and the clock are substituted.
pub struct TestContext {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<MockTransport>,
    pub engine: AnalyticsEngine,
}

impl TestContext {
    /// Create a context with default configuration. The engine is not
    /// initialized yet.
    pub fn new() -> Self {
        Self::with_config(quiet_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::on_store(config, MemoryStore::new())
    }

    /// Create a context sharing `store` with other engines.
    pub fn on_store(config: EngineConfig, store: MemoryStore) -> Self {
        let clock = Arc::new(ManualClock::new(START_TIME));
        let transport = Arc::new(MockTransport::new());
        let engine = AnalyticsEngine::with_transport(
            config,
            Arc::new(store.clone()),
            clock.clone(),
            transport.clone(),
        )
        .expect("Failed to build engine");

        Self {
            store,
            clock,
            transport,
            engine,
        }
    }

    /// Create and initialize.
    pub async fn started() -> Self {
        let ctx = Self::new();
        ctx.engine.init().await.expect("Failed to init engine");
        ctx
    }

    pub fn advance(&self, ms: i64) {
        self.clock.advance(ms);
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
