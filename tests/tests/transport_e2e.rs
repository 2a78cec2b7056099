//! Tests for real-time signaling between engines sharing one store.

use api::{AnalyticsEngine, EngineConfig};
use engine_core::{GoalType, ManualClock, MessageType, TransportMessage};
use integration_tests::fixtures::{goal, quiet_config, START_TIME};
use integration_tests::setup::TestContext;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use storage::MemoryStore;
use telemetry::HealthStatus;
use tokio::sync::mpsc;
use transport::{handler, ConnectionState, StatusEvent};

fn simulated_engine(config: EngineConfig, store: &MemoryStore) -> AnalyticsEngine {
    AnalyticsEngine::new(
        config,
        Arc::new(store.clone()),
        Arc::new(ManualClock::new(START_TIME)),
    )
    .expect("Failed to build engine")
}

/// A goal completed in one tab reaches subscribers in another
#[tokio::test]
async fn test_goal_completion_crosses_engines() {
    let store = MemoryStore::new();
    let mut config = quiet_config();
    config.goals.goals = vec![goal("first-download", GoalType::ResumeDownload, 1)];
    let sender = simulated_engine(config, &store);
    let receiver = simulated_engine(quiet_config(), &store);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = receiver.subscribe(
        MessageType::GoalCompletion,
        handler(move |m| {
            let _ = tx.send(m.data["goalId"].as_str().unwrap_or_default().to_string());
        }),
    );

    sender.init().await.unwrap();
    receiver.init().await.unwrap();
    sender.track_resume_download("hero");

    let goal_id = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("completion should arrive")
        .unwrap();
    assert_eq!(goal_id, "first-download");

    sender.destroy().await;
    receiver.destroy().await;
}

/// Synthetic traffic keeps the active visitor count fresh
#[tokio::test(start_paused = true)]
async fn test_synthetic_visitor_updates() {
    let store = MemoryStore::new();
    let mut config = quiet_config();
    config.transport.synthetic_interval_ms = 1_000;
    let engine = simulated_engine(config, &store);
    engine.init().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let realtime = engine.realtime_metrics();
    assert!(realtime.active_visitors > 0);
    assert_eq!(
        engine.metrics_snapshot().active_visitors,
        realtime.active_visitors
    );
    engine.destroy().await;
}

/// Status changes are observable and mirrored into health
#[tokio::test]
async fn test_status_events_and_health() {
    let store = MemoryStore::new();
    let engine = simulated_engine(quiet_config(), &store);
    let mut status = engine.status_events();

    engine.init().await.unwrap();
    let mut seen = Vec::new();
    while let Ok(event) = status.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&StatusEvent::Connected));
    assert_eq!(engine.connection_status(), ConnectionState::Connected);
    assert_eq!(engine.health().status, HealthStatus::Healthy);

    engine.destroy().await;
    assert_eq!(engine.connection_status(), ConnectionState::Disconnected);
    assert_eq!(engine.health().status, HealthStatus::Degraded);
}

/// Visitor updates from the server land in realtime metrics
#[tokio::test]
async fn test_injected_visitor_update() {
    let ctx = TestContext::started().await;
    let delivered = ctx.transport.inject(TransportMessage::new(
        MessageType::VisitorUpdate,
        json!({ "activeVisitors": 7 }),
        START_TIME + 10,
    ));
    assert_eq!(delivered, 1);
    assert_eq!(ctx.engine.realtime_metrics().active_visitors, 7);

    // After destroy the engine no longer listens.
    ctx.engine.destroy().await;
    let delivered = ctx.transport.inject(TransportMessage::new(
        MessageType::VisitorUpdate,
        json!({ "activeVisitors": 9 }),
        START_TIME + 20,
    ));
    assert_eq!(delivered, 0);
    assert_eq!(ctx.engine.realtime_metrics().active_visitors, 7);
}

/// Malformed visitor updates are ignored
#[tokio::test]
async fn test_visitor_update_without_count() {
    let ctx = TestContext::started().await;
    ctx.transport.inject(TransportMessage::new(
        MessageType::VisitorUpdate,
        json!({ "visitors": "many" }),
        START_TIME,
    ));
    assert_eq!(ctx.engine.realtime_metrics().active_visitors, 0);
    ctx.engine.destroy().await;
}
