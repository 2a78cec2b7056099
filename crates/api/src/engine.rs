//! The analytics engine facade.
//!
//! Owns one instance of every component, wired to a single store, transport
//! and clock. All tracking calls are no-ops until [`AnalyticsEngine::init`]
//! and after [`AnalyticsEngine::destroy`].

use capture::{CaptureEngine, CaptureOutcome, DomEvent, HeatmapQuery, ReplayFrame};
use engine_core::limits::MAX_STORED_EVENTS;
use engine_core::{
    AbTest, AnalyticsEvent, EventCategory, Goal, HeatmapPoint, MessageType, PerformanceAlert,
    RealtimeMetrics, Result, Session, SharedClock, Timestamp, TransportMessage,
};
use experiments::{build_report, AbTestCoordinator, TestReport};
use goals::{FormAction, FunnelStage, GoalOrchestrator, ProfessionalMetrics};
use parking_lot::Mutex;
use performance::{
    NoopPerformanceSource, PerformanceEntry, PerformanceMonitor, PerformanceReport,
    PerformanceSource,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use storage::export::{self, ExportFormat};
use storage::{keys, KeyValueStore, PersistenceGateway};
use telemetry::{HealthRegistry, HealthReport, Metrics, MetricsSnapshot};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use transport::{
    build_transport, handler, ConnectionState, Handler, StatusEvent, Subscription, Transport,
    TransportContext,
};
use uuid::Uuid;
use worker::WorkerScheduler;

use crate::config::EngineConfig;

const FLUSH_WORKER: &str = "persistence_flush";
const REPORT_WORKER: &str = "performance_report";
const TIMEOUT_WORKER: &str = "session_timeout";

/// Session id used for assignments and events when no session is open.
const ANONYMOUS_SESSION: &str = "anonymous";

struct EngineInner {
    config: EngineConfig,
    clock: SharedClock,
    gateway: PersistenceGateway,
    transport: Arc<dyn Transport>,
    health: Arc<HealthRegistry>,
    metrics: Arc<Metrics>,
    performance_source: Arc<dyn PerformanceSource>,
    capture: Mutex<CaptureEngine>,
    experiments: Mutex<AbTestCoordinator>,
    performance: Mutex<PerformanceMonitor>,
    goals: Mutex<GoalOrchestrator>,
    realtime: Mutex<RealtimeMetrics>,
    events: Mutex<Vec<AnalyticsEvent>>,
    visitor_subscription: Mutex<Option<Subscription>>,
    workers: WorkerScheduler,
    active: AtomicBool,
}

/// Behavioral analytics engine.
///
/// Cheap to clone; clones share the same components.
#[derive(Clone)]
pub struct AnalyticsEngine {
    inner: Arc<EngineInner>,
}

impl AnalyticsEngine {
    /// Builds an engine whose transport is chosen by `config.transport`.
    pub fn new(config: EngineConfig, store: Arc<dyn KeyValueStore>, clock: SharedClock) -> Result<Self> {
        let health = Arc::new(HealthRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let gateway = PersistenceGateway::new(store, config.storage.namespace.clone());
        let ctx = TransportContext::new(clock.clone())
            .with_health(health.clone())
            .with_metrics(metrics.clone());
        let transport = build_transport(&config.transport, gateway.clone(), ctx);
        Self::assemble(config, gateway, clock, transport, health, metrics)
    }

    /// Builds an engine around a caller-supplied transport.
    pub fn with_transport(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let gateway = PersistenceGateway::new(store, config.storage.namespace.clone());
        Self::assemble(
            config,
            gateway,
            clock,
            transport,
            Arc::new(HealthRegistry::new()),
            Arc::new(Metrics::new()),
        )
    }

    fn assemble(
        config: EngineConfig,
        gateway: PersistenceGateway,
        clock: SharedClock,
        transport: Arc<dyn Transport>,
        health: Arc<HealthRegistry>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let capture = CaptureEngine::new(config.capture.clone(), gateway.clone(), clock.clone())
            .with_metrics(metrics.clone());
        let experiments =
            AbTestCoordinator::from_config(&config.experiments, gateway.clone(), clock.clone())?;
        let performance = PerformanceMonitor::new(&config.performance, gateway.clone(), clock.clone())
            .with_metrics(metrics.clone());
        let goals = GoalOrchestrator::new(&config.goals, gateway.clone(), clock.clone())
            .with_metrics(metrics.clone());

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                clock,
                gateway,
                transport,
                health,
                metrics,
                performance_source: Arc::new(NoopPerformanceSource),
                capture: Mutex::new(capture),
                experiments: Mutex::new(experiments),
                performance: Mutex::new(performance),
                goals: Mutex::new(goals),
                realtime: Mutex::new(RealtimeMetrics::default()),
                events: Mutex::new(Vec::new()),
                visitor_subscription: Mutex::new(None),
                workers: WorkerScheduler::new(),
                active: AtomicBool::new(false),
            }),
        })
    }

    /// Declares what timing entries the host can report. Call before `init`.
    pub fn with_performance_source(mut self, source: Arc<dyn PerformanceSource>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.performance_source = source,
            None => warn!("Engine already shared, performance source unchanged"),
        }
        self
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Loads stored state, opens the first session, connects the transport
    /// and starts the background timers.
    ///
    /// A transport that cannot connect leaves the engine running in a
    /// degraded state; only storage problems with the first session fail.
    pub async fn init(&self) -> Result<()> {
        if self.is_active() {
            debug!("Engine already initialized");
            return Ok(());
        }
        let inner = &self.inner;

        if inner.gateway.check() {
            inner.health.storage.set_healthy();
        } else {
            inner.health.storage.set_unhealthy("storage check failed");
            warn!("Storage check failed, data may not persist");
        }

        inner
            .capture
            .lock()
            .init(&inner.config.page, inner.config.viewport)?;
        inner.experiments.lock().load();
        {
            let mut performance = inner.performance.lock();
            performance.load();
            performance.set_page(&inner.config.page);
            performance.start(inner.performance_source.as_ref());
        }
        inner.goals.lock().load();
        *inner.realtime.lock() = inner.gateway.load(keys::REALTIME_METRICS);
        *inner.events.lock() = inner.gateway.load(keys::EVENTS);

        self.subscribe_visitor_updates();

        if let Err(e) = inner.transport.connect().await {
            warn!(error = %e, mode = inner.transport.mode(), "Transport unavailable, running degraded");
        }

        self.start_workers();
        inner.active.store(true, Ordering::SeqCst);
        info!(
            page = %inner.config.page,
            transport = inner.transport.mode(),
            "Analytics engine initialized"
        );
        Ok(())
    }

    /// Ends the session, flushes everything and disconnects. Idempotent.
    pub async fn destroy(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let inner = &self.inner;
        inner.workers.stop_all();
        inner.performance.lock().stop();
        inner.goals.lock().page_hidden();
        inner.capture.lock().destroy();
        flush(inner);
        if let Some(subscription) = inner.visitor_subscription.lock().take() {
            subscription.unsubscribe();
        }
        inner.transport.disconnect().await;
        info!("Analytics engine destroyed");
    }

    fn subscribe_visitor_updates(&self) {
        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.transport.subscribe(
            MessageType::VisitorUpdate,
            handler(move |message| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let Some(visitors) = message.data.get("activeVisitors").and_then(Value::as_u64)
                else {
                    debug!("Visitor update without a count");
                    return;
                };
                inner.metrics.active_visitors.set(visitors);
                let mut realtime = inner.realtime.lock();
                realtime.active_visitors = visitors;
                realtime.last_updated = message.timestamp;
            }),
        );
        if let Some(old) = self.inner.visitor_subscription.lock().replace(subscription) {
            old.unsubscribe();
        }
    }

    fn start_workers(&self) {
        let inner = &self.inner;
        let config = &inner.config.worker;

        let weak = Arc::downgrade(inner);
        inner.workers.every(FLUSH_WORKER, config.flush_interval(), move || {
            with_inner(&weak, flush);
        });

        let weak = Arc::downgrade(inner);
        inner
            .workers
            .every(REPORT_WORKER, config.report_interval(), move || {
                with_inner(&weak, |inner| {
                    if let Err(e) = inner.performance.lock().snapshot_report() {
                        error!(error = %e, "Failed to store performance report");
                    }
                });
            });

        let weak = Arc::downgrade(inner);
        inner
            .workers
            .every(TIMEOUT_WORKER, config.timeout_check_interval(), move || {
                with_inner(&weak, |inner| {
                    inner.capture.lock().check_timeout();
                });
            });
    }

    fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// Runs `f` if the engine is active.
    fn guarded<T>(&self, f: impl FnOnce(&EngineInner) -> T) -> Option<T> {
        if !self.is_active() {
            debug!("Tracking call ignored, engine inactive");
            return None;
        }
        self.inner.metrics.tracking_calls.inc();
        Some(f(&*self.inner))
    }

    /// Runs `f` on the goal orchestrator and publishes what it queued once
    /// the lock is released, so subscribers may read engine state.
    fn with_goals(inner: &EngineInner, f: impl FnOnce(&mut GoalOrchestrator)) {
        let outbox = {
            let mut goals = inner.goals.lock();
            f(&mut *goals);
            goals.take_outbox()
        };
        for message in outbox {
            inner.transport.send(message);
        }
    }

    fn session_id(inner: &EngineInner) -> String {
        inner
            .capture
            .lock()
            .session_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| ANONYMOUS_SESSION.to_string())
    }

    fn record_event(&self, inner: &EngineInner, name: &str, category: EventCategory, properties: Value) {
        let (page, session_id) = {
            let capture = inner.capture.lock();
            (
                capture.page().to_string(),
                capture
                    .session_id()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| ANONYMOUS_SESSION.to_string()),
            )
        };
        let event = AnalyticsEvent::new(name, category, page, session_id, self.now(), properties);
        debug!(event = %event.name, category = category.as_str(), "Tracked event");

        let mut events = inner.events.lock();
        events.push(event);
        if let Err(e) = inner
            .gateway
            .save_capped(keys::EVENTS, &mut *events, MAX_STORED_EVENTS)
        {
            inner.metrics.storage_errors.inc();
            warn!(error = %e, "Failed to persist events");
        } else {
            inner.metrics.storage_writes.inc();
        }
    }

    pub fn track_page_view(&self, path: &str, title: &str) {
        self.guarded(|inner| {
            {
                let mut realtime = inner.realtime.lock();
                realtime.page_views += 1;
                *realtime.pages.entry(path.to_string()).or_default() += 1;
                realtime.last_updated = self.now();
            }
            let page_changed = inner.capture.lock().page() != path;
            if page_changed {
                inner.capture.lock().handle(DomEvent::Navigation {
                    to: path.to_string(),
                });
            }
            inner.performance.lock().set_page(path);
            self.record_event(
                inner,
                "page_view",
                EventCategory::PageView,
                json!({ "path": path, "title": title }),
            );
            Self::with_goals(inner, |goals| goals.track_page_view(path));
        });
    }

    pub fn track_project_view(&self, project_id: &str, name: &str) {
        self.guarded(|inner| {
            self.record_event(
                inner,
                "project_view",
                EventCategory::Engagement,
                json!({ "projectId": project_id, "name": name }),
            );
            Self::with_goals(inner, |goals| goals.track_project_view(project_id, name));
        });
    }

    pub fn track_game_completion(
        &self,
        game_id: &str,
        completed: bool,
        time_spent_ms: u64,
        score: Option<f64>,
    ) {
        self.guarded(|inner| {
            self.record_event(
                inner,
                "game_completion",
                EventCategory::Engagement,
                json!({
                    "gameId": game_id,
                    "completed": completed,
                    "timeSpent": time_spent_ms,
                    "score": score,
                }),
            );
            Self::with_goals(inner, |goals| {
                goals.track_game_completion(game_id, completed, time_spent_ms, score)
            });
        });
    }

    /// `action` is one of `view`, `start`, `focus` or `submit`. `data` may
    /// carry `formId` (default `contact`), `field` for focus, and the
    /// submitted `fields` object whose values are never stored.
    pub fn track_contact_form_interaction(&self, action: &str, data: &Value) {
        self.guarded(|inner| {
            let form_id = data
                .get("formId")
                .and_then(Value::as_str)
                .unwrap_or("contact");
            let field = data.get("field").and_then(Value::as_str);
            let Some(form_action) = FormAction::parse(action, field) else {
                inner.metrics.events_rejected.inc();
                warn!(action = %action, "Unknown form action");
                return;
            };
            let fields: Vec<String> = data
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| fields.keys().cloned().collect())
                .unwrap_or_default();

            let category = match form_action {
                FormAction::Submit => EventCategory::Conversion,
                _ => EventCategory::Interaction,
            };
            self.record_event(
                inner,
                &format!("form_{}", action),
                category,
                json!({ "formId": form_id, "field": field, "fields": fields }),
            );
            Self::with_goals(inner, |goals| goals.track_form(form_id, form_action, &fields));
        });
    }

    pub fn track_resume_download(&self, source: &str) {
        self.guarded(|inner| {
            self.record_event(
                inner,
                "resume_download",
                EventCategory::Conversion,
                json!({ "source": source }),
            );
            Self::with_goals(inner, |goals| goals.track_resume_download(source));
        });
    }

    pub fn track_social_media_click(&self, platform: &str, url: &str) {
        self.guarded(|inner| {
            self.record_event(
                inner,
                "social_media_click",
                EventCategory::Engagement,
                json!({ "platform": platform, "url": url }),
            );
            Self::with_goals(inner, |goals| goals.track_social_click(platform, url));
        });
    }

    pub fn track_interaction(&self, element: &str, action: &str, meta: Value) {
        self.guarded(|inner| {
            {
                let mut realtime = inner.realtime.lock();
                realtime.interactions += 1;
                realtime.last_updated = self.now();
            }
            self.record_event(
                inner,
                action,
                EventCategory::Interaction,
                json!({ "element": element, "meta": meta }),
            );
        });
    }

    /// Records an application error and publishes an `error_report`.
    pub fn track_error(&self, error: &str, context: Value) {
        self.guarded(|inner| {
            {
                let mut realtime = inner.realtime.lock();
                realtime.errors += 1;
                realtime.last_updated = self.now();
            }
            self.record_event(
                inner,
                "error",
                EventCategory::Error,
                json!({ "message": error, "context": context.clone() }),
            );
            let page = inner.capture.lock().page().to_string();
            inner.transport.send(TransportMessage::new(
                MessageType::ErrorReport,
                json!({ "message": error, "page": page, "context": context }),
                self.now(),
            ));
        });
    }

    /// Feeds a host DOM event into behavior capture.
    pub fn handle_dom_event(&self, event: DomEvent) -> CaptureOutcome {
        if !self.is_active() {
            return CaptureOutcome::Ignored;
        }
        let leaving = matches!(event, DomEvent::PageHidden | DomEvent::Unload { .. });
        let outcome = self.inner.capture.lock().handle(event);
        if leaving {
            self.inner.goals.lock().page_hidden();
        }
        outcome
    }

    /// Feeds a host timing entry into the performance monitor and publishes
    /// any budget alerts it raised.
    pub fn observe_performance(&self, entry: PerformanceEntry) -> Vec<PerformanceAlert> {
        if !self.is_active() {
            return Vec::new();
        }
        let alerts = self.inner.performance.lock().observe(entry);
        for alert in &alerts {
            match TransportMessage::from_payload(MessageType::PerformanceAlert, alert, alert.timestamp) {
                Ok(message) => self.inner.transport.send(message),
                Err(e) => warn!(error = %e, "Failed to encode performance alert"),
            }
        }
        alerts
    }

    pub fn register_test(&self, test: AbTest) -> Result<()> {
        self.inner.experiments.lock().register(test)
    }

    /// Variant for the current session; `None` when excluded or the test
    /// is not running.
    pub fn assign_variant(&self, test_id: &str) -> Option<String> {
        self.guarded(|inner| {
            let session_id = Self::session_id(inner);
            inner.experiments.lock().assign_variant(test_id, &session_id)
        })
        .flatten()
    }

    pub fn record_test_result(
        &self,
        test_id: &str,
        variant_id: &str,
        metric: &str,
        value: f64,
    ) -> Result<()> {
        self.guarded(|inner| {
            let session_id = Self::session_id(inner);
            inner
                .experiments
                .lock()
                .record_result(test_id, variant_id, metric, value, &session_id)
        })
        .unwrap_or(Ok(()))
    }

    pub fn test_report(&self, test_id: &str, metric: &str) -> Option<TestReport> {
        let experiments = self.inner.experiments.lock();
        let test = experiments.test(test_id)?;
        Some(build_report(
            test,
            &experiments.results(test_id),
            metric,
            self.now(),
        ))
    }

    pub fn realtime_metrics(&self) -> RealtimeMetrics {
        self.inner.realtime.lock().clone()
    }

    pub fn heatmap(&self, query: &HeatmapQuery) -> Vec<HeatmapPoint> {
        self.inner.capture.lock().heatmap().query(query)
    }

    /// Archived sessions, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.capture.lock().recorder().sessions()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.capture.lock().current_session().cloned()
    }

    pub fn replay(&self, session_id: Uuid, cursor: Timestamp) -> Result<ReplayFrame> {
        self.inner.capture.lock().replay(session_id, cursor)
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.inner.events.lock().clone()
    }

    pub fn performance_reports(&self) -> Vec<PerformanceReport> {
        self.inner.performance.lock().reports().to_vec()
    }

    /// Takes a performance report now instead of waiting for the timer.
    pub fn snapshot_performance(&self) -> Result<PerformanceReport> {
        self.inner.performance.lock().snapshot_report()
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.inner.goals.lock().goals().to_vec()
    }

    pub fn upsert_goal(&self, goal: Goal) {
        self.inner.goals.lock().upsert_goal(goal);
    }

    pub fn funnel(&self, funnel_id: &str) -> Option<Vec<FunnelStage>> {
        self.inner.goals.lock().funnel(funnel_id)
    }

    pub fn professional_metrics(&self) -> ProfessionalMetrics {
        self.inner.goals.lock().professional_metrics().clone()
    }

    pub fn health(&self) -> HealthReport {
        self.inner.health.report()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner
            .metrics
            .queue_depth
            .set(self.inner.transport.queued() as u64);
        self.inner.metrics.snapshot()
    }

    pub fn connection_status(&self) -> ConnectionState {
        self.inner.transport.status()
    }

    pub fn status_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.transport.status_events()
    }

    pub fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription {
        self.inner.transport.subscribe(message_type, handler)
    }

    /// Retries the transport with a fresh attempt budget.
    pub async fn reconnect(&self) -> Result<()> {
        self.inner.transport.reconnect().await
    }

    /// Writes every in-memory structure to storage now.
    pub fn flush(&self) {
        flush(&self.inner);
    }

    pub fn export_events(&self, format: ExportFormat) -> Result<String> {
        export::export(self.inner.events.lock().as_slice(), format)
    }

    pub fn export_heatmap(&self, query: &HeatmapQuery, format: ExportFormat) -> Result<String> {
        self.inner.capture.lock().heatmap().export(query, format)
    }

    pub fn export_sessions(&self, format: ExportFormat) -> Result<String> {
        self.inner.capture.lock().recorder().export(format)
    }

    pub fn export_performance(&self, format: ExportFormat) -> Result<String> {
        self.inner.performance.lock().export(format)
    }
}

fn with_inner(weak: &Weak<EngineInner>, f: impl FnOnce(&EngineInner)) {
    if let Some(inner) = weak.upgrade() {
        f(&*inner);
    }
}

fn flush(inner: &EngineInner) {
    let started = Instant::now();
    let mut failures = 0;

    if let Err(e) = inner.capture.lock().flush() {
        failures += 1;
        warn!(error = %e, "Capture flush failed");
    }
    if let Err(e) = inner.goals.lock().flush() {
        failures += 1;
        warn!(error = %e, "Goal flush failed");
    }
    let realtime = inner.realtime.lock().clone();
    if let Err(e) = inner.gateway.save(keys::REALTIME_METRICS, &realtime) {
        failures += 1;
        warn!(error = %e, "Realtime metrics flush failed");
    }

    if failures == 0 {
        inner.health.storage.set_healthy();
        inner.metrics.storage_writes.inc();
    } else {
        inner.metrics.storage_errors.inc_by(failures);
        inner
            .health
            .storage
            .set_unhealthy(format!("{} flush writes failed", failures));
    }
    inner
        .metrics
        .flush_latency_ms
        .observe(started.elapsed().as_millis() as u64);
    debug!(failures, "Flushed engine state");
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::ElementInfo;
    use engine_core::{AbTest, GoalType, ManualClock, Timeframe, Variant};
    use performance::HostPerformanceSource;
    use std::time::Duration;
    use storage::MemoryStore;
    use telemetry::HealthStatus;
    use tokio::sync::mpsc;

    fn quiet_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.transport.synthetic_interval_ms = 0;
        config
    }

    fn build(config: EngineConfig) -> (AnalyticsEngine, Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::new();
        let engine = AnalyticsEngine::new(config, Arc::new(store.clone()), clock.clone())
            .unwrap()
            .with_performance_source(Arc::new(HostPerformanceSource::full()));
        (engine, clock, store)
    }

    fn click() -> DomEvent {
        DomEvent::Click {
            x: 10.0,
            y: 10.0,
            button: 0,
            element: ElementInfo::new("a").with_id("resume"),
        }
    }

    #[tokio::test]
    async fn test_calls_are_noops_until_init_and_after_destroy() {
        let (engine, _, _) = build(quiet_config());
        engine.track_page_view("/", "Home");
        assert_eq!(engine.handle_dom_event(click()), CaptureOutcome::Ignored);
        assert!(engine.events().is_empty());

        engine.init().await.unwrap();
        engine.track_page_view("/", "Home");
        assert_eq!(engine.events().len(), 1);

        engine.destroy().await;
        engine.track_page_view("/about", "About");
        assert_eq!(engine.events().len(), 1);
        assert_eq!(engine.realtime_metrics().page_views, 1);
        assert_eq!(engine.connection_status(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_page_views_update_realtime_and_session() {
        let (engine, _, _) = build(quiet_config());
        engine.init().await.unwrap();
        engine.track_page_view("/", "Home");
        engine.track_page_view("/work", "Work");
        engine.track_page_view("/work", "Work");

        let realtime = engine.realtime_metrics();
        assert_eq!(realtime.page_views, 3);
        assert_eq!(realtime.top_pages(1), vec![("/work".to_string(), 2)]);

        assert_eq!(engine.handle_dom_event(click()), CaptureOutcome::Captured);
        let session = engine.current_session().unwrap();
        assert_eq!(session.click_count(), 1);
        assert_eq!(engine.heatmap(&HeatmapQuery::page("/work")).len(), 1);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_archives_session_and_persists() {
        let (engine, clock, store) = build(quiet_config());
        engine.init().await.unwrap();
        engine.handle_dom_event(click());
        clock.advance(4_000);
        engine.destroy().await;

        let sessions = engine.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration, 4_000);

        // A second engine on the same store sees the archive.
        let other = AnalyticsEngine::new(
            quiet_config(),
            Arc::new(store),
            Arc::new(ManualClock::new(10_000)),
        )
        .unwrap();
        other.init().await.unwrap();
        assert_eq!(other.sessions().len(), 1);
        other.destroy().await;
    }

    #[tokio::test]
    async fn test_goal_completion_reaches_subscribers() {
        let mut config = quiet_config();
        config.goals.goals = vec![Goal::new(
            "resume",
            GoalType::ResumeDownload,
            1,
            Timeframe::AllTime,
        )];
        let (engine, _, _) = build(config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = engine.subscribe(
            MessageType::GoalCompletion,
            handler(move |m| {
                let _ = tx.send(m.data["goalId"].as_str().unwrap_or_default().to_string());
            }),
        );

        engine.init().await.unwrap();
        engine.track_resume_download("header");
        engine.track_resume_download("footer");

        assert_eq!(rx.try_recv().unwrap(), "resume");
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.metrics_snapshot().goal_completions, 1);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_subscribers_can_read_engine_state() {
        let mut config = quiet_config();
        config.goals.goals = vec![Goal::new(
            "resume",
            GoalType::ResumeDownload,
            1,
            Timeframe::AllTime,
        )];
        let (engine, _, _) = build(config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subs: Vec<Subscription> = [
            MessageType::GoalCompletion,
            MessageType::ResumeDownload,
            MessageType::FormSubmission,
            MessageType::PerformanceAlert,
        ]
        .into_iter()
        .map(|message_type| {
            let reader = engine.clone();
            let tx = tx.clone();
            engine.subscribe(
                message_type,
                handler(move |m| {
                    let goals = reader.goals().len();
                    let reports = reader.performance_reports().len();
                    let downloads: u64 = reader
                        .professional_metrics()
                        .resume_downloads
                        .values()
                        .sum();
                    let _ = tx.send((m.message_type, goals, reports, downloads));
                }),
            )
        })
        .collect();
        engine.init().await.unwrap();

        let worker = engine.clone();
        let tracked = tokio::task::spawn_blocking(move || {
            worker.track_resume_download("header");
            worker.track_contact_form_interaction("submit", &json!({}));
            worker.observe_performance(PerformanceEntry::LargestContentfulPaint {
                start_time: 4500.0,
                size: 0,
            });
        });
        tokio::time::timeout(Duration::from_secs(2), tracked)
            .await
            .expect("tracking calls must not block on their own subscribers")
            .unwrap();

        let seen: Vec<(MessageType, usize, usize, u64)> =
            std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let kinds: Vec<MessageType> = seen.iter().map(|s| s.0).collect();
        assert_eq!(
            kinds,
            vec![
                MessageType::ResumeDownload,
                MessageType::GoalCompletion,
                MessageType::FormSubmission,
                MessageType::PerformanceAlert,
            ]
        );
        // State is already updated when subscribers run.
        assert!(seen.iter().all(|s| s.1 == 1 && s.3 == 1));
        drop(subs);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_form_submission_keeps_field_names_only() {
        let (engine, _, _) = build(quiet_config());
        engine.init().await.unwrap();
        for _ in 0..2 {
            engine.track_contact_form_interaction("view", &json!({}));
        }
        engine.track_contact_form_interaction(
            "submit",
            &json!({ "fields": { "email": "me@example.com", "message": "hello there" } }),
        );

        let stats = engine.professional_metrics().forms["contact"].clone();
        assert_eq!(stats.submissions, 1);
        assert!((stats.conversion_rate - 0.5).abs() < 1e-9);

        let exported = engine.export_events(ExportFormat::Json).unwrap();
        assert!(!exported.contains("me@example.com"));
        assert!(exported.contains("form_submit"));
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_performance_alerts_and_reports() {
        let (engine, _, _) = build(quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = engine.subscribe(
            MessageType::PerformanceAlert,
            handler(move |m| {
                let _ = tx.send(m.data["severity"].as_str().unwrap_or_default().to_string());
            }),
        );
        engine.init().await.unwrap();

        let alerts = engine.observe_performance(PerformanceEntry::LargestContentfulPaint {
            start_time: 4500.0,
            size: 0,
        });
        assert_eq!(alerts.len(), 1);
        assert_eq!(rx.try_recv().unwrap(), "critical");

        let report = engine.snapshot_performance().unwrap();
        assert_eq!(report.vitals.lcp, Some(4500.0));
        assert_eq!(engine.performance_reports().len(), 1);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_assignment_uses_current_session() {
        let mut config = quiet_config();
        config.experiments.seed = Some(9);
        config.experiments.tests = vec![AbTest {
            id: "hero".into(),
            name: String::new(),
            variants: vec![Variant {
                id: "only".into(),
                name: String::new(),
                weight: 100.0,
                enabled: true,
            }],
            active: true,
            start_date: None,
            end_date: None,
            metrics: vec![],
        }];
        let (engine, _, _) = build(config);
        assert_eq!(engine.assign_variant("hero"), None);

        engine.init().await.unwrap();
        assert_eq!(engine.assign_variant("hero").as_deref(), Some("only"));
        engine.record_test_result("hero", "only", "click", 1.0).unwrap();
        let report = engine.test_report("hero", "click").unwrap();
        assert_eq!(report.variants[0].samples, 1);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_visitor_updates_feed_realtime_metrics() {
        let (engine, _, _) = build(quiet_config());
        engine.init().await.unwrap();
        engine.inner.transport.send(TransportMessage::new(
            MessageType::VisitorUpdate,
            json!({ "activeVisitors": 12 }),
            2_000,
        ));
        assert_eq!(engine.realtime_metrics().active_visitors, 12);
        assert_eq!(engine.health().status, HealthStatus::Healthy);
        engine.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_worker_ends_idle_session() {
        let mut config = quiet_config();
        config.worker.timeout_check_interval_ms = 1_000;
        let (engine, clock, _) = build(config);
        engine.init().await.unwrap();
        let first = engine.current_session().unwrap().id;

        clock.advance(engine_core::limits::SESSION_TIMEOUT_MS + 1);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(engine.current_session().is_none());
        assert_eq!(engine.sessions()[0].id, first);

        // Activity opens a fresh session.
        engine.handle_dom_event(click());
        assert_ne!(engine.current_session().unwrap().id, first);
        engine.destroy().await;
    }
}
