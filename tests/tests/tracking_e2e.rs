//! End-to-end tests for the tracking calls and what they publish.

use capture::{CaptureOutcome, DomEvent, ElementInfo, HeatmapQuery};
use engine_core::{GoalType, InteractionType, MessageType, Metric};
use goals::FunnelDefinition;
use integration_tests::fixtures::{ab_test, click_at, goal, lcp, pointer_at, quiet_config, scroll_to};
use integration_tests::setup::TestContext;
use serde_json::json;
use std::time::Duration;
use storage::ExportFormat;
use tokio::sync::mpsc;
use transport::handler;

/// Page views update realtime counters and move the session to the new page
#[tokio::test]
async fn test_page_views_and_navigation() {
    let ctx = TestContext::started().await;

    ctx.engine.track_page_view("/", "Home");
    ctx.engine.track_page_view("/projects", "Projects");
    ctx.engine.track_page_view("/projects", "Projects");

    let realtime = ctx.engine.realtime_metrics();
    assert_eq!(realtime.page_views, 3);
    assert_eq!(realtime.unique_pages(), 2);
    assert_eq!(realtime.top_pages(1)[0], ("/projects".to_string(), 2));

    // Same session, now on the new page.
    ctx.engine.handle_dom_event(click_at(10.0, 10.0, "card"));
    let session = ctx.engine.current_session().unwrap();
    assert_eq!(session.page, "/");
    assert_eq!(session.click_count(), 1);
    assert_eq!(
        ctx.engine.heatmap(&HeatmapQuery::page("/projects")).len(),
        1
    );
    assert!(ctx.engine.heatmap(&HeatmapQuery::page("/")).is_empty());

    let events = ctx.engine.events();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.session_id == session.id.to_string()));
}

/// Clicks in one grid cell on one element aggregate into one point
#[tokio::test]
async fn test_heatmap_aggregation() {
    let ctx = TestContext::started().await;

    ctx.engine.handle_dom_event(click_at(3.0, 4.0, "cta"));
    ctx.advance(50);
    ctx.engine.handle_dom_event(click_at(15.0, 19.0, "cta"));
    ctx.advance(50);
    ctx.engine.handle_dom_event(click_at(45.0, 4.0, "cta"));

    let mut points = ctx
        .engine
        .heatmap(&HeatmapQuery::page("/").with_interaction(InteractionType::Click));
    points.sort_by_key(|p| p.cell_x);
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].count, 2);
    assert!((points[0].intensity - 0.4).abs() < 1e-9);
    assert_eq!(points[1].count, 1);
    assert!((points[1].intensity - 0.3).abs() < 1e-9);

    let csv = ctx
        .engine
        .export_heatmap(&HeatmapQuery::page("/"), ExportFormat::Csv)
        .unwrap();
    assert_eq!(csv.lines().count(), 3);
}

/// High-frequency events are throttled per kind
#[tokio::test]
async fn test_scroll_and_pointer_throttling() {
    let ctx = TestContext::started().await;

    assert_eq!(
        ctx.engine.handle_dom_event(scroll_to(800.0)),
        CaptureOutcome::Captured
    );
    ctx.advance(100);
    assert_eq!(
        ctx.engine.handle_dom_event(scroll_to(1600.0)),
        CaptureOutcome::Throttled
    );
    assert_eq!(
        ctx.engine.handle_dom_event(pointer_at(1.0, 1.0)),
        CaptureOutcome::Captured
    );
    ctx.advance(200);
    assert_eq!(
        ctx.engine.handle_dom_event(scroll_to(2400.0)),
        CaptureOutcome::Captured
    );

    let session = ctx.engine.current_session().unwrap();
    assert_eq!(session.scroll.max_depth, 75.0);
    let milestones: Vec<u8> = session.scroll.milestones.iter().map(|m| m.percent).collect();
    assert_eq!(milestones, vec![25, 50, 75]);

    let snapshot = ctx.engine.metrics_snapshot();
    assert_eq!(snapshot.events_throttled, 1);
}

/// Typed input keeps only metadata
#[tokio::test]
async fn test_input_values_are_not_recorded() {
    let ctx = TestContext::started().await;
    ctx.engine.handle_dom_event(DomEvent::Input {
        element: ElementInfo::new("input").with_id("email"),
        field_type: "email".into(),
        value: "someone@example.com".into(),
    });
    ctx.engine.destroy().await;

    let exported = ctx.engine.export_sessions(ExportFormat::Json).unwrap();
    assert!(!exported.contains("someone@example.com"));
}

/// Form submissions publish field names, never values
#[tokio::test]
async fn test_form_submission_message() {
    let ctx = TestContext::started().await;

    ctx.engine.track_contact_form_interaction("view", &json!({}));
    ctx.engine.track_contact_form_interaction("start", &json!({}));
    ctx.engine.track_contact_form_interaction(
        "submit",
        &json!({ "fields": { "name": "Ada", "email": "ada@example.com" } }),
    );

    let sent = ctx.transport.sent_of(MessageType::FormSubmission);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data["formId"], "contact");
    let mut fields: Vec<&str> = sent[0].data["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["email", "name"]);
    assert!(!serde_json::to_string(&sent[0])
        .unwrap()
        .contains("ada@example.com"));

    let stats = ctx.engine.professional_metrics().forms["contact"].clone();
    assert_eq!((stats.views, stats.starts, stats.submissions), (1, 1, 1));
    assert!((stats.conversion_rate - 1.0).abs() < 1e-9);
}

/// Leaving a started form records where the visitor stopped
#[tokio::test]
async fn test_form_abandonment_on_hidden_page() {
    let ctx = TestContext::started().await;

    ctx.engine
        .track_contact_form_interaction("view", &json!({ "formId": "newsletter" }));
    ctx.engine.track_contact_form_interaction(
        "focus",
        &json!({ "formId": "newsletter", "field": "email" }),
    );
    ctx.engine.handle_dom_event(DomEvent::PageHidden);

    let stats = ctx.engine.professional_metrics().forms["newsletter"].clone();
    assert_eq!(stats.abandonments.get("email"), Some(&1));
    assert_eq!(stats.field_focus.get("email"), Some(&1));
}

/// Unknown form actions are rejected without side effects
#[tokio::test]
async fn test_unknown_form_action() {
    let ctx = TestContext::started().await;
    ctx.engine.track_contact_form_interaction("explode", &json!({}));
    assert!(ctx.engine.events().is_empty());
    assert_eq!(ctx.engine.metrics_snapshot().events_rejected, 1);
}

/// Goals publish one completion when the target is reached
#[tokio::test]
async fn test_goal_completion_published_once() {
    let mut config = quiet_config();
    config.goals.goals = vec![
        goal("social", GoalType::SocialClick, 2),
        goal("projects", GoalType::ProjectView, 5),
    ];
    let ctx = TestContext::with_config(config);
    ctx.engine.init().await.unwrap();

    for _ in 0..3 {
        ctx.engine
            .track_social_media_click("github", "https://github.com/example");
    }
    ctx.engine.track_project_view("engine", "Analytics Engine");

    let completions = ctx.transport.sent_of(MessageType::GoalCompletion);
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].data["goalId"], "social");
    assert_eq!(ctx.transport.sent_of(MessageType::SocialMediaClick).len(), 3);

    let goals = ctx.engine.goals();
    let projects = goals.iter().find(|g| g.id == "projects").unwrap();
    assert_eq!(projects.current, 1);
    assert!(!projects.is_complete());
}

/// A dashboard handler may read engine state from inside its callback
#[tokio::test]
async fn test_completion_handler_reads_goals() {
    let mut config = quiet_config();
    config.goals.goals = vec![goal("social", GoalType::SocialClick, 1)];
    let ctx = TestContext::with_config(config);
    ctx.engine.init().await.unwrap();

    let reader = ctx.engine.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = ctx.engine.subscribe(
        MessageType::GoalCompletion,
        handler(move |_| {
            let current = reader.goals()[0].current;
            let clicks = reader.professional_metrics().social_clicks["github"];
            let _ = tx.send((current, clicks, reader.performance_reports().len()));
        }),
    );

    let engine = ctx.engine.clone();
    let tracked = tokio::task::spawn_blocking(move || {
        engine.track_social_media_click("github", "https://github.com/example");
    });
    tokio::time::timeout(Duration::from_secs(2), tracked)
        .await
        .expect("tracking call stalled inside its own subscriber")
        .unwrap();

    assert_eq!(rx.try_recv().unwrap(), (1, 1, 0));
}

/// Funnels count the steps the tracking calls emit
#[tokio::test]
async fn test_contact_funnel() {
    let mut config = quiet_config();
    config.goals.funnels = vec![FunnelDefinition {
        id: "contact".into(),
        name: "Contact".into(),
        steps: vec![
            "page_view".into(),
            "form_view".into(),
            "form_submission".into(),
        ],
    }];
    let ctx = TestContext::with_config(config);
    ctx.engine.init().await.unwrap();

    for _ in 0..4 {
        ctx.engine.track_page_view("/contact", "Contact");
    }
    ctx.engine.track_contact_form_interaction("view", &json!({}));
    ctx.engine.track_contact_form_interaction("view", &json!({}));
    ctx.engine.track_contact_form_interaction("submit", &json!({}));

    let stages = ctx.engine.funnel("contact").unwrap();
    let counts: Vec<u64> = stages.iter().map(|s| s.count).collect();
    assert_eq!(counts, vec![4, 2, 1]);
    assert_eq!(stages[0].conversion_rate, 100.0);
    assert_eq!(stages[1].conversion_rate, 50.0);
    assert_eq!(stages[2].conversion_rate, 50.0);
    assert!(ctx.engine.funnel("missing").is_none());
}

/// Games keep per-game completion stats
#[tokio::test]
async fn test_game_completion_stats() {
    let ctx = TestContext::started().await;
    ctx.engine.track_game_completion("snake", true, 30_000, Some(120.0));
    ctx.engine.track_game_completion("snake", false, 5_000, None);

    let games = ctx.engine.professional_metrics().games;
    let snake = &games["snake"];
    assert_eq!(snake.plays, 2);
    assert_eq!(snake.completions, 1);
    assert_eq!(snake.best_score, Some(120.0));
}

/// Errors are counted and reported over the transport
#[tokio::test]
async fn test_error_report() {
    let ctx = TestContext::started().await;
    ctx.engine
        .track_error("TypeError: x is undefined", json!({ "component": "Hero" }));

    assert_eq!(ctx.engine.realtime_metrics().errors, 1);
    let reports = ctx.transport.sent_of(MessageType::ErrorReport);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].data["message"], "TypeError: x is undefined");
    assert_eq!(reports[0].data["context"]["component"], "Hero");
}

/// Budget violations alert once per severity step
#[tokio::test]
async fn test_performance_alerts_escalate_once() {
    let ctx = TestContext::started().await;

    assert_eq!(ctx.engine.observe_performance(lcp(3000.0)).len(), 1);
    assert!(ctx.engine.observe_performance(lcp(3500.0)).is_empty());
    assert_eq!(ctx.engine.observe_performance(lcp(4500.0)).len(), 1);

    let alerts = ctx.transport.sent_of(MessageType::PerformanceAlert);
    let severities: Vec<&str> = alerts
        .iter()
        .map(|m| m.data["severity"].as_str().unwrap())
        .collect();
    assert_eq!(severities, vec!["warning", "critical"]);
    assert_eq!(ctx.engine.metrics_snapshot().alerts_emitted, 2);

    let report = ctx.engine.snapshot_performance().unwrap();
    assert_eq!(report.vitals.get(Metric::Lcp), Some(4500.0));
    let csv = ctx.engine.export_performance(ExportFormat::Csv).unwrap();
    assert!(csv.starts_with("id,timestamp,page,lcp"));
}

/// A/B assignment is stable for the session and feeds the report
#[tokio::test]
async fn test_ab_assignment_and_report() {
    let mut config = quiet_config();
    config.experiments.seed = Some(42);
    config.experiments.tests = vec![ab_test("hero", &[("control", 50.0), ("bold", 50.0)])];
    let ctx = TestContext::with_config(config);
    ctx.engine.init().await.unwrap();

    let variant = ctx.engine.assign_variant("hero").expect("fully weighted test");
    for _ in 0..5 {
        assert_eq!(ctx.engine.assign_variant("hero").as_deref(), Some(variant.as_str()));
    }
    assert_eq!(ctx.engine.assign_variant("unknown"), None);

    ctx.engine
        .record_test_result("hero", &variant, "conversion", 1.0)
        .unwrap();
    assert!(ctx
        .engine
        .record_test_result("hero", "ghost", "conversion", 1.0)
        .is_err());

    let report = ctx.engine.test_report("hero", "conversion").unwrap();
    let arm = report
        .variants
        .iter()
        .find(|v| v.variant_id == variant)
        .unwrap();
    assert_eq!(arm.samples, 1);
}

/// Event export carries every tracked call
#[tokio::test]
async fn test_event_export_formats() {
    let ctx = TestContext::started().await;
    ctx.engine.track_page_view("/", "Home");
    ctx.engine
        .track_interaction("nav-link", "click", json!({ "href": "/about" }));

    let csv = ctx.engine.export_events(ExportFormat::Csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("id,name,category,page,session_id,timestamp,properties")
    );
    assert_eq!(lines.count(), 2);

    let json: serde_json::Value =
        serde_json::from_str(&ctx.engine.export_events(ExportFormat::Json).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(ctx.engine.realtime_metrics().interactions, 1);
}
