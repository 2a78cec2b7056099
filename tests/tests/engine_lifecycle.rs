//! Lifecycle tests: init, pause/resume, timeouts, destroy and reload.

use capture::{CaptureOutcome, DomEvent};
use engine_core::{ExitType, SessionState};
use integration_tests::fixtures::{click_at, quiet_config, scroll_to, START_TIME};
use integration_tests::setup::TestContext;
use storage::{keys, KeyValueStore};
use telemetry::HealthStatus;
use transport::ConnectionState;

/// Tracking calls before init leave no trace
#[tokio::test]
async fn test_uninitialized_engine_ignores_everything() {
    let ctx = TestContext::new();

    ctx.engine.track_page_view("/", "Home");
    ctx.engine.track_resume_download("header");
    assert_eq!(
        ctx.engine.handle_dom_event(click_at(1.0, 1.0, "cta")),
        CaptureOutcome::Ignored
    );

    assert!(ctx.engine.events().is_empty());
    assert!(ctx.engine.current_session().is_none());
    assert!(ctx.transport.sent().is_empty());
    assert_eq!(ctx.transport.connect_count(), 0);
}

/// Init opens a session on the configured page and connects once
#[tokio::test]
async fn test_init_opens_session_and_connects() {
    let ctx = TestContext::started().await;

    let session = ctx.engine.current_session().expect("session should be open");
    assert_eq!(session.page, "/");
    assert_eq!(session.start_time, START_TIME);
    assert_eq!(session.state, SessionState::Recording);
    assert_eq!(ctx.engine.connection_status(), ConnectionState::Connected);

    // A second init is a no-op.
    ctx.engine.init().await.unwrap();
    assert_eq!(ctx.transport.connect_count(), 1);
    assert_eq!(ctx.engine.current_session().unwrap().id, session.id);
}

/// A transport that will not connect leaves the engine usable
#[tokio::test]
async fn test_transport_failure_degrades_but_keeps_tracking() {
    let ctx = TestContext::new();
    ctx.transport.set_should_fail(true);

    ctx.engine.init().await.expect("init should survive transport failure");
    assert!(ctx.engine.is_active());
    assert_eq!(ctx.engine.connection_status(), ConnectionState::GaveUp);

    ctx.engine.track_page_view("/", "Home");
    assert_eq!(ctx.engine.events().len(), 1);

    ctx.transport.set_should_fail(false);
    ctx.engine.reconnect().await.unwrap();
    assert_eq!(ctx.engine.connection_status(), ConnectionState::Connected);
}

/// Hidden pages pause capture and keep the same session
#[tokio::test]
async fn test_hidden_page_pauses_and_resumes() {
    let ctx = TestContext::started().await;
    let id = ctx.engine.current_session().unwrap().id;

    ctx.advance(1_000);
    assert_eq!(
        ctx.engine.handle_dom_event(DomEvent::PageHidden),
        CaptureOutcome::Captured
    );
    assert_eq!(
        ctx.engine.handle_dom_event(click_at(5.0, 5.0, "cta")),
        CaptureOutcome::Ignored
    );

    ctx.advance(10_000);
    ctx.engine.handle_dom_event(DomEvent::PageVisible);
    ctx.advance(2_000);
    assert_eq!(
        ctx.engine.handle_dom_event(click_at(5.0, 5.0, "cta")),
        CaptureOutcome::Captured
    );

    ctx.engine.destroy().await;
    let sessions = ctx.engine.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, id);
    assert_eq!(sessions[0].duration, 13_000);
    assert_eq!(sessions[0].active_time, 3_000);
    assert_eq!(sessions[0].exit_type, Some(ExitType::Close));
}

/// Destroying while hidden records a hidden exit
#[tokio::test]
async fn test_destroy_while_hidden() {
    let ctx = TestContext::started().await;
    ctx.engine.handle_dom_event(DomEvent::PageHidden);
    ctx.engine.destroy().await;

    assert_eq!(ctx.engine.sessions()[0].exit_type, Some(ExitType::Hidden));
    assert_eq!(ctx.engine.connection_status(), ConnectionState::Disconnected);
}

/// Unload ends the session; the next activity starts a fresh one
#[tokio::test]
async fn test_unload_then_activity_starts_new_session() {
    let ctx = TestContext::started().await;
    let first = ctx.engine.current_session().unwrap().id;

    ctx.engine
        .handle_dom_event(DomEvent::Unload { navigating: true });
    assert!(ctx.engine.current_session().is_none());
    assert_eq!(
        ctx.engine.sessions()[0].exit_type,
        Some(ExitType::Navigation)
    );

    ctx.advance(500);
    ctx.engine.handle_dom_event(scroll_to(800.0));
    let second = ctx.engine.current_session().unwrap();
    assert_ne!(second.id, first);
    assert_eq!(second.scroll.max_depth, 25.0);
    ctx.engine.destroy().await;
    assert_eq!(ctx.engine.sessions().len(), 2);
}

/// Activity after the idle timeout rolls over to a new session
#[tokio::test]
async fn test_idle_timeout_on_next_activity() {
    let ctx = TestContext::started().await;
    let first = ctx.engine.current_session().unwrap().id;

    ctx.advance(engine_core::limits::SESSION_TIMEOUT_MS + 1);
    ctx.engine.handle_dom_event(click_at(1.0, 1.0, "cta"));

    let sessions = ctx.engine.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, first);
    assert_eq!(sessions[0].exit_type, Some(ExitType::Timeout));
    assert_ne!(ctx.engine.current_session().unwrap().id, first);
    ctx.engine.destroy().await;
}

/// State written by one engine is visible to the next on the same store
#[tokio::test]
async fn test_state_survives_restart() {
    let first = TestContext::started().await;
    first.engine.track_page_view("/", "Home");
    first.engine.track_resume_download("header");
    first.engine.handle_dom_event(click_at(30.0, 30.0, "cta"));
    first.advance(2_000);
    first.engine.destroy().await;

    assert!(first.store.get("analytics:sessions").unwrap().is_some());
    assert!(first
        .store
        .get(&format!("analytics:{}", keys::EVENTS))
        .unwrap()
        .is_some());

    let second = TestContext::on_store(quiet_config(), first.store.clone());
    second.engine.init().await.unwrap();
    assert_eq!(second.engine.events().len(), 2);
    assert_eq!(second.engine.sessions().len(), 1);
    assert_eq!(
        second
            .engine
            .professional_metrics()
            .resume_downloads
            .get("header"),
        Some(&1)
    );
    assert_eq!(second.engine.realtime_metrics().page_views, 1);
    second.engine.destroy().await;
}

/// Health reflects storage and transport
#[tokio::test]
async fn test_health_after_init() {
    let ctx = TestContext::started().await;
    let report = ctx.engine.health();
    // The mock transport does not report into the registry.
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report
        .components
        .iter()
        .any(|c| c.name == "storage" && c.healthy));
    ctx.engine.destroy().await;
}
