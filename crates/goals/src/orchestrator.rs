//! Goal orchestration.

use engine_core::{
    Goal, GoalCompletion, GoalType, MessageType, Result, SharedClock, Timestamp, TransportMessage,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use storage::{keys, PersistenceGateway};
use telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::forms::{FormAction, FormStats};
use crate::funnel::{Funnel, FunnelDefinition, FunnelStage};
use crate::professional::ProfessionalMetrics;
use crate::window::window_start;

/// Goals and funnels known at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalsConfig {
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub funnels: Vec<FunnelDefinition>,
}

/// Funnel step names emitted by the tracking calls.
pub mod steps {
    pub const PAGE_VIEW: &str = "page_view";
    pub const PROJECT_VIEW: &str = "project_view";
    pub const GAME_COMPLETION: &str = "game_completion";
    pub const FORM_VIEW: &str = "form_view";
    pub const FORM_START: &str = "form_start";
    pub const FORM_SUBMISSION: &str = "form_submission";
    pub const RESUME_DOWNLOAD: &str = "resume_download";
    pub const SOCIAL_CLICK: &str = "social_click";
}

/// Counts business outcomes.
///
/// Completions and the other outbound signals are queued rather than sent;
/// the owner drains them with [`GoalOrchestrator::take_outbox`] once it no
/// longer holds any lock around the orchestrator.
pub struct GoalOrchestrator {
    gateway: PersistenceGateway,
    clock: SharedClock,
    outbox: Vec<TransportMessage>,
    metrics: Option<Arc<Metrics>>,
    goals: Vec<Goal>,
    funnels: Vec<Funnel>,
    professional: ProfessionalMetrics,
}

impl GoalOrchestrator {
    pub fn new(config: &GoalsConfig, gateway: PersistenceGateway, clock: SharedClock) -> Self {
        Self {
            gateway,
            clock,
            outbox: Vec::new(),
            metrics: None,
            goals: config.goals.clone(),
            funnels: config.funnels.iter().map(Funnel::from).collect(),
            professional: ProfessionalMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Restores stored progress. Stored goals and funnels replace configured
    /// ones with the same id; stored ones no longer configured are kept.
    pub fn load(&mut self) {
        let stored_goals: Vec<Goal> = self.gateway.load(keys::GOALS);
        for stored in stored_goals {
            match self.goals.iter_mut().find(|g| g.id == stored.id) {
                Some(goal) => {
                    goal.current = stored.current;
                    goal.window_start = stored.window_start;
                    goal.completed_at = stored.completed_at;
                }
                None => self.goals.push(stored),
            }
        }

        let stored_funnels: Vec<Funnel> = self.gateway.load(keys::FUNNELS);
        for stored in stored_funnels {
            match self.funnels.iter_mut().find(|f| f.id == stored.id) {
                Some(funnel) if funnel.steps == stored.steps => funnel.counts = stored.counts,
                Some(_) => warn!(funnel_id = %stored.id, "Funnel steps changed, dropping stored counts"),
                None => self.funnels.push(stored),
            }
        }

        self.professional = self.gateway.load(keys::PROFESSIONAL_METRICS);
        self.roll_over();
        debug!(
            goals = self.goals.len(),
            funnels = self.funnels.len(),
            "Loaded goal data"
        );
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn publish(&mut self, message_type: MessageType, data: serde_json::Value) {
        let message = TransportMessage::new(message_type, data, self.now());
        self.outbox.push(message);
    }

    /// Messages queued since the last call, oldest first.
    pub fn take_outbox(&mut self) -> Vec<TransportMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn persist_goals(&self) {
        if let Err(e) = self.gateway.save(keys::GOALS, &self.goals) {
            warn!(error = %e, "Failed to persist goals");
        }
    }

    fn persist_funnels(&self) {
        if let Err(e) = self.gateway.save(keys::FUNNELS, &self.funnels) {
            warn!(error = %e, "Failed to persist funnels");
        }
    }

    fn persist_professional(&self) {
        if let Err(e) = self.gateway.save(keys::PROFESSIONAL_METRICS, &self.professional) {
            warn!(error = %e, "Failed to persist professional metrics");
        }
    }

    /// Resets goals whose timeframe window has elapsed.
    pub fn roll_over(&mut self) -> usize {
        let now = self.now();
        let mut rolled = 0;
        for goal in &mut self.goals {
            let start = window_start(goal.timeframe, now);
            if goal.window_start == start {
                continue;
            }
            if goal.window_start.is_some() {
                info!(goal_id = %goal.id, previous = goal.current, "Goal window rolled over");
                rolled += 1;
            }
            goal.window_start = start;
            goal.current = 0;
            goal.completed_at = None;
        }
        if rolled > 0 {
            self.persist_goals();
        }
        rolled
    }

    /// Advances active goals of `goal_type`; queues each goal's completion
    /// at most once per window.
    fn advance_goals(&mut self, goal_type: GoalType, detail: serde_json::Value) {
        if !self.goals.iter().any(|g| g.active && g.goal_type == goal_type) {
            return;
        }
        self.roll_over();
        let now = self.now();

        let mut completions = Vec::new();
        for goal in self
            .goals
            .iter_mut()
            .filter(|g| g.active && g.goal_type == goal_type)
        {
            goal.current += 1;
            if goal.is_complete() && goal.completed_at.is_none() {
                goal.completed_at = Some(now);
                completions.push(GoalCompletion {
                    goal_id: goal.id.clone(),
                    goal_type,
                    detail: detail.clone(),
                    value: goal.current,
                    timestamp: now,
                });
            }
        }
        self.persist_goals();

        for completion in completions {
            info!(goal_id = %completion.goal_id, value = completion.value, "Goal completed");
            if let Some(metrics) = &self.metrics {
                metrics.goal_completions.inc();
            }
            match TransportMessage::from_payload(MessageType::GoalCompletion, &completion, now) {
                Ok(message) => self.outbox.push(message),
                Err(e) => warn!(error = %e, "Failed to encode goal completion"),
            }
        }
    }

    fn advance_funnels(&mut self, step: &str) {
        let mut changed = false;
        for funnel in &mut self.funnels {
            changed |= funnel.record(step);
        }
        if changed {
            self.persist_funnels();
        }
    }

    /// Counts an explicit step on one funnel.
    pub fn record_funnel_step(&mut self, funnel_id: &str, step: &str) -> bool {
        let recorded = self
            .funnels
            .iter_mut()
            .find(|f| f.id == funnel_id)
            .is_some_and(|f| f.record(step));
        if recorded {
            self.persist_funnels();
        }
        recorded
    }

    pub fn track_page_view(&mut self, path: &str) {
        self.advance_goals(GoalType::PageView, json!({ "path": path }));
        self.advance_funnels(steps::PAGE_VIEW);
    }

    pub fn track_project_view(&mut self, project_id: &str, name: &str) {
        let stats = self
            .professional
            .project_views
            .entry(project_id.to_string())
            .or_default();
        stats.views += 1;
        if !name.is_empty() {
            stats.name = name.to_string();
        }
        self.persist_professional();
        self.advance_goals(GoalType::ProjectView, json!({ "projectId": project_id }));
        self.advance_funnels(steps::PROJECT_VIEW);
    }

    pub fn track_game_completion(
        &mut self,
        game_id: &str,
        completed: bool,
        time_spent_ms: u64,
        score: Option<f64>,
    ) {
        self.professional
            .games
            .entry(game_id.to_string())
            .or_default()
            .record(completed, time_spent_ms, score);
        self.persist_professional();
        if completed {
            self.advance_goals(GoalType::GameCompletion, json!({ "gameId": game_id }));
            self.advance_funnels(steps::GAME_COMPLETION);
        }
    }

    /// Applies a form interaction. Submissions queue `form_submission`
    /// with field names only, never values.
    pub fn track_form(&mut self, form_id: &str, action: FormAction, fields: &[String]) {
        let stats = self
            .professional
            .forms
            .entry(form_id.to_string())
            .or_default();
        stats.apply(&action);
        let conversion_rate = stats.conversion_rate;
        self.persist_professional();

        match action {
            FormAction::View => self.advance_funnels(steps::FORM_VIEW),
            FormAction::Start => self.advance_funnels(steps::FORM_START),
            FormAction::FieldFocus { .. } => {}
            FormAction::Submit => {
                self.publish(
                    MessageType::FormSubmission,
                    json!({
                        "formId": form_id,
                        "fields": fields,
                        "conversionRate": conversion_rate,
                    }),
                );
                self.advance_goals(GoalType::FormSubmission, json!({ "formId": form_id }));
                self.advance_funnels(steps::FORM_SUBMISSION);
            }
        }
    }

    /// Records abandonments for forms left mid-way when the page goes away.
    pub fn page_hidden(&mut self) -> Vec<(String, String)> {
        let abandoned: Vec<(String, String)> = self
            .professional
            .forms
            .iter_mut()
            .filter_map(|(id, stats)| stats.abandon().map(|field| (id.clone(), field)))
            .collect();
        for (form_id, field) in &abandoned {
            info!(form_id = %form_id, field = %field, "Form abandoned");
        }
        if !abandoned.is_empty() {
            self.persist_professional();
        }
        abandoned
    }

    pub fn track_resume_download(&mut self, source: &str) {
        *self
            .professional
            .resume_downloads
            .entry(source.to_string())
            .or_default() += 1;
        self.persist_professional();
        self.publish(MessageType::ResumeDownload, json!({ "source": source }));
        self.advance_goals(GoalType::ResumeDownload, json!({ "source": source }));
        self.advance_funnels(steps::RESUME_DOWNLOAD);
    }

    pub fn track_social_click(&mut self, platform: &str, url: &str) {
        *self
            .professional
            .social_clicks
            .entry(platform.to_string())
            .or_default() += 1;
        self.persist_professional();
        self.publish(
            MessageType::SocialMediaClick,
            json!({ "platform": platform, "url": url }),
        );
        self.advance_goals(GoalType::SocialClick, json!({ "platform": platform }));
        self.advance_funnels(steps::SOCIAL_CLICK);
    }

    /// Adds or replaces a goal.
    pub fn upsert_goal(&mut self, mut goal: Goal) {
        goal.window_start = window_start(goal.timeframe, self.now());
        match self.goals.iter_mut().find(|g| g.id == goal.id) {
            Some(existing) => *existing = goal,
            None => self.goals.push(goal),
        }
        self.persist_goals();
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    pub fn funnel(&self, funnel_id: &str) -> Option<Vec<FunnelStage>> {
        self.funnels
            .iter()
            .find(|f| f.id == funnel_id)
            .map(Funnel::stages)
    }

    pub fn funnels(&self) -> &[Funnel] {
        &self.funnels
    }

    pub fn form_stats(&self, form_id: &str) -> Option<&FormStats> {
        self.professional.forms.get(form_id)
    }

    pub fn professional_metrics(&self) -> &ProfessionalMetrics {
        &self.professional
    }

    /// Writes everything back to storage.
    pub fn flush(&self) -> Result<()> {
        self.gateway.save(keys::GOALS, &self.goals)?;
        self.gateway.save(keys::FUNNELS, &self.funnels)?;
        self.gateway.save(keys::PROFESSIONAL_METRICS, &self.professional)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{ManualClock, Timeframe};
    use std::collections::HashMap;
    use storage::MemoryStore;

    /// 2024-05-16T12:00:00Z
    const NOON: Timestamp = 1_715_860_800_000;
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    struct Fixture {
        orchestrator: GoalOrchestrator,
        gateway: PersistenceGateway,
        clock: Arc<ManualClock>,
    }

    fn fixture(config: GoalsConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(NOON));
        let gateway = PersistenceGateway::new(Arc::new(MemoryStore::new()), "analytics");
        let mut orchestrator = GoalOrchestrator::new(&config, gateway.clone(), clock.clone());
        orchestrator.load();
        Fixture {
            orchestrator,
            gateway,
            clock,
        }
    }

    #[test]
    fn test_goal_completion_published_once_per_window() {
        let config = GoalsConfig {
            goals: vec![Goal::new("daily-downloads", GoalType::ResumeDownload, 2, Timeframe::Daily)],
            funnels: vec![],
        };
        let mut f = fixture(config);

        for _ in 0..4 {
            f.orchestrator.track_resume_download("header");
        }
        let completions: Vec<TransportMessage> = f
            .orchestrator
            .take_outbox()
            .into_iter()
            .filter(|m| m.message_type == MessageType::GoalCompletion)
            .collect();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].data["goalId"], "daily-downloads");
        assert_eq!(completions[0].data["value"], 2);
        assert_eq!(f.orchestrator.goal("daily-downloads").unwrap().current, 4);

        // Next day the window resets and completion can fire again.
        f.clock.advance(DAY_MS);
        f.orchestrator.track_resume_download("header");
        assert_eq!(f.orchestrator.goal("daily-downloads").unwrap().current, 1);
        f.orchestrator.track_resume_download("footer");
        let completions = f
            .orchestrator
            .take_outbox()
            .into_iter()
            .filter(|m| m.message_type == MessageType::GoalCompletion)
            .count();
        assert_eq!(completions, 1);
    }

    #[test]
    fn test_form_flow_conversion_and_messages() {
        let mut f = fixture(GoalsConfig::default());
        for _ in 0..10 {
            f.orchestrator.track_form("contact", FormAction::View, &[]);
        }
        let fields = vec!["name".to_string(), "email".to_string()];
        for _ in 0..3 {
            f.orchestrator.track_form("contact", FormAction::Submit, &fields);
        }
        let stats = f.orchestrator.form_stats("contact").unwrap();
        assert!((stats.conversion_rate - 0.3).abs() < 1e-9);

        let submissions: Vec<TransportMessage> = f.orchestrator.take_outbox();
        assert_eq!(submissions.len(), 3);
        assert_eq!(submissions[2].message_type, MessageType::FormSubmission);
        assert_eq!(submissions[2].data["fields"][1], "email");

        f.orchestrator.track_form("contact", FormAction::Submit, &fields);
        let stats = f.orchestrator.form_stats("contact").unwrap();
        assert!((stats.conversion_rate - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_hidden_page_records_abandonment() {
        let mut f = fixture(GoalsConfig::default());
        f.orchestrator.track_form("contact", FormAction::Start, &[]);
        f.orchestrator.track_form(
            "contact",
            FormAction::FieldFocus {
                field: "message".into(),
            },
            &[],
        );
        let abandoned = f.orchestrator.page_hidden();
        assert_eq!(abandoned, vec![("contact".to_string(), "message".to_string())]);

        let stored: ProfessionalMetrics = f.gateway.load(keys::PROFESSIONAL_METRICS);
        assert_eq!(stored.forms["contact"].abandonments.get("message"), Some(&1));
    }

    #[test]
    fn test_funnel_stages_from_tracking() {
        let config = GoalsConfig {
            goals: vec![],
            funnels: vec![FunnelDefinition {
                id: "contact".into(),
                name: "Contact".into(),
                steps: vec![
                    steps::PAGE_VIEW.into(),
                    steps::FORM_VIEW.into(),
                    steps::FORM_SUBMISSION.into(),
                ],
            }],
        };
        let mut f = fixture(config);
        for _ in 0..10 {
            f.orchestrator.track_page_view("/contact");
        }
        for _ in 0..4 {
            f.orchestrator.track_form("contact", FormAction::View, &[]);
        }
        f.orchestrator.track_form("contact", FormAction::Submit, &[]);

        let stages = f.orchestrator.funnel("contact").unwrap();
        let rates: Vec<f64> = stages.iter().map(|s| s.conversion_rate).collect();
        assert_eq!(rates, vec![100.0, 40.0, 25.0]);
        assert!(f.orchestrator.funnel("missing").is_none());
    }

    #[test]
    fn test_professional_metrics_persist_under_one_key() {
        let mut f = fixture(GoalsConfig::default());
        f.orchestrator.track_resume_download("header");
        f.orchestrator.track_social_click("github", "https://github.com/someone");
        f.orchestrator.track_social_click("github", "https://github.com/someone");
        f.orchestrator.track_project_view("raytracer", "Ray Tracer");
        f.orchestrator.track_game_completion("snake", true, 45_000, Some(310.0));

        let stored: ProfessionalMetrics = f.gateway.load(keys::PROFESSIONAL_METRICS);
        assert_eq!(stored.resume_downloads["header"], 1);
        assert_eq!(stored.social_clicks["github"], 2);
        assert_eq!(stored.project_views["raytracer"].name, "Ray Tracer");
        assert_eq!(stored.games["snake"].best_score, Some(310.0));

        let kinds: HashMap<MessageType, usize> =
            f.orchestrator
                .take_outbox()
                .into_iter()
                .fold(HashMap::new(), |mut acc, m| {
                    *acc.entry(m.message_type).or_default() += 1;
                    acc
                });
        assert_eq!(kinds[&MessageType::ResumeDownload], 1);
        assert_eq!(kinds[&MessageType::SocialMediaClick], 2);
    }

    #[test]
    fn test_progress_survives_reload() {
        let config = GoalsConfig {
            goals: vec![Goal::new("views", GoalType::ProjectView, 10, Timeframe::AllTime)],
            funnels: vec![],
        };
        let mut f = fixture(config.clone());
        for _ in 0..3 {
            f.orchestrator.track_project_view("p1", "");
        }

        let mut reloaded = GoalOrchestrator::new(&config, f.gateway.clone(), f.clock.clone());
        reloaded.load();
        assert_eq!(reloaded.goal("views").unwrap().current, 3);
        assert_eq!(reloaded.professional_metrics().project_views["p1"].views, 3);
    }

    #[test]
    fn test_outbox_drains_in_order() {
        let mut f = fixture(GoalsConfig::default());
        f.orchestrator.track_resume_download("header");
        f.orchestrator.track_social_click("github", "https://github.com/someone");
        let kinds: Vec<MessageType> = f
            .orchestrator
            .take_outbox()
            .into_iter()
            .map(|m| m.message_type)
            .collect();
        assert_eq!(
            kinds,
            vec![MessageType::ResumeDownload, MessageType::SocialMediaClick]
        );
        assert!(f.orchestrator.take_outbox().is_empty());
    }
}
