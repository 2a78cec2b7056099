//! Analytics Engine
//!
//! Standalone host for the behavioral analytics engine:
//! - Session capture, heatmaps and replay data
//! - A/B test assignment and result tracking
//! - Performance budgets and goal tracking
//! - Real-time signaling over WebSocket or a simulated shared-store bus

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use api::{AnalyticsEngine, EngineConfig};
use engine_core::SystemClock;
use storage::open_store;
use telemetry::init_tracing_from_env;

/// How often the host logs a metrics line.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("Starting Analytics Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        page = %config.page,
        transport = ?config.transport.mode,
        storage = ?config.storage.backend,
        "Loaded configuration"
    );

    let store = open_store(&config.storage).context("Failed to open storage")?;
    let engine = AnalyticsEngine::new(config, store, Arc::new(SystemClock))
        .context("Failed to build analytics engine")?;

    engine
        .init()
        .await
        .context("Failed to initialize analytics engine")?;

    let health = engine.health();
    info!(status = ?health.status, "Engine running");

    let mut status_ticker = tokio::time::interval(STATUS_INTERVAL);
    status_ticker.tick().await;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status_ticker.tick() => {
                let snapshot = engine.metrics_snapshot();
                info!(
                    events = snapshot.events_captured,
                    throttled = snapshot.events_throttled,
                    sessions_ended = snapshot.sessions_ended,
                    sent = snapshot.messages_sent,
                    received = snapshot.messages_received,
                    queued = snapshot.queue_depth,
                    flush_p95_ms = snapshot.flush_latency_p95_ms,
                    visitors = snapshot.active_visitors,
                    connection = ?engine.connection_status(),
                    "Engine status"
                );
            }
        }
    }

    info!("Shutting down...");
    engine.destroy().await;
    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from defaults, an optional file and the environment.
fn load_config() -> Result<EngineConfig> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&EngineConfig::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // e.g. ANALYTICS__TRANSPORT__SYNTHETIC_INTERVAL_MS=0
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ANALYTICS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
