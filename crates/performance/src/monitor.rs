//! Web vitals tracking and budget alerts.

use engine_core::limits::MAX_PERFORMANCE_REPORTS;
use engine_core::{
    Metric, PerformanceAlert, Result, Severity, SharedClock, Threshold, WebVitals,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use storage::export::{self, ExportFormat};
use storage::{keys, PersistenceGateway};
use telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::Budgets;
use crate::entry::{EntryKind, NetworkInfo, PerformanceEntry, PerformanceSource};
use crate::report::{PerformanceReport, ResourceBreakdown, ResourceCategory};
use crate::score::quality_score;

/// Blocking time counts only the part of a long task past this.
const LONG_TASK_BUDGET_MS: f64 = 50.0;

/// Report cadence lives in the worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Per-metric overrides of the default budgets
    #[serde(default)]
    pub budgets: BTreeMap<Metric, Threshold>,
}

fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Warning => 1,
        Severity::Critical => 2,
    }
}

/// Keeps the current page's vitals and checks them against budgets.
///
/// An alert is raised when a metric first crosses a budget and again if it
/// escalates from warning to critical. Each new document load starts a fresh
/// alert record. Alerts are returned to the caller and never persisted.
pub struct PerformanceMonitor {
    gateway: PersistenceGateway,
    clock: SharedClock,
    metrics: Option<Arc<Metrics>>,
    budgets: Budgets,
    observing: bool,
    supported: BTreeSet<EntryKind>,
    page: String,
    vitals: WebVitals,
    dom_interactive: Option<f64>,
    last_long_task_end: f64,
    long_tasks: u64,
    resources: ResourceBreakdown,
    network: Option<NetworkInfo>,
    alerted: BTreeMap<Metric, Severity>,
    reports: Vec<PerformanceReport>,
}

impl PerformanceMonitor {
    pub fn new(config: &PerformanceConfig, gateway: PersistenceGateway, clock: SharedClock) -> Self {
        Self {
            gateway,
            clock,
            metrics: None,
            budgets: Budgets::with_overrides(&config.budgets),
            observing: false,
            supported: BTreeSet::new(),
            page: "/".to_string(),
            vitals: WebVitals::default(),
            dom_interactive: None,
            last_long_task_end: 0.0,
            long_tasks: 0,
            resources: ResourceBreakdown::default(),
            network: None,
            alerted: BTreeMap::new(),
            reports: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn load(&mut self) {
        self.reports = self.gateway.load(keys::PERFORMANCE_REPORTS);
    }

    /// Registers for whatever `source` can observe. Missing kinds are logged
    /// and the metrics depending on them stay empty.
    pub fn start(&mut self, source: &dyn PerformanceSource) {
        self.supported = EntryKind::ALL
            .into_iter()
            .filter(|kind| source.supports(*kind))
            .collect();
        for kind in EntryKind::ALL {
            if !self.supported.contains(&kind) {
                warn!(entry_type = kind.as_str(), "Performance entry type not supported");
            }
        }
        if let Some(network) = source.network_info() {
            self.network = Some(network);
        }
        self.observing = true;
        info!(observed = self.supported.len(), "Performance monitor started");
    }

    /// Unregisters from every entry type.
    pub fn stop(&mut self) {
        if self.observing {
            self.observing = false;
            self.supported.clear();
            info!("Performance monitor stopped");
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Vitals and alerts are per document load.
    fn begin_document(&mut self) {
        debug!(page = %self.page, "New document load, resetting vitals");
        self.vitals = WebVitals::default();
        self.dom_interactive = None;
        self.last_long_task_end = 0.0;
        self.long_tasks = 0;
        self.resources = ResourceBreakdown::default();
        self.alerted.clear();
    }

    /// Relabels alerts and reports after a same-document route change
    /// without discarding the measured vitals.
    pub fn set_page(&mut self, page: &str) {
        self.page = page.to_string();
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn set_network(&mut self, network: NetworkInfo) {
        self.network = Some(network);
    }

    pub fn set_budget(&mut self, metric: Metric, threshold: Threshold) {
        info!(metric = metric.as_str(), warning = threshold.warning, error = threshold.error, "Budget updated");
        self.budgets.set(metric, threshold);
        self.alerted.remove(&metric);
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    pub fn vitals(&self) -> &WebVitals {
        &self.vitals
    }

    pub fn resources(&self) -> &ResourceBreakdown {
        &self.resources
    }

    /// Applies one entry and returns any alerts it raised.
    pub fn observe(&mut self, entry: PerformanceEntry) -> Vec<PerformanceAlert> {
        if !self.observing {
            return Vec::new();
        }
        if !self.supported.contains(&entry.kind()) {
            debug!(entry_type = entry.kind().as_str(), "Dropping entry of unobserved type");
            return Vec::new();
        }

        let mut updated = Vec::new();
        match entry {
            PerformanceEntry::Paint { name, start_time } => {
                if name == "first-contentful-paint" && self.vitals.fcp.is_none() {
                    self.vitals.fcp = Some(start_time);
                    updated.push(Metric::Fcp);
                }
            }
            PerformanceEntry::LargestContentfulPaint { start_time, .. } => {
                self.vitals.lcp = Some(start_time);
                updated.push(Metric::Lcp);
            }
            PerformanceEntry::LayoutShift {
                value,
                had_recent_input,
            } => {
                if !had_recent_input {
                    let cls = self.vitals.cls.unwrap_or(0.0) + value.max(0.0);
                    self.vitals.cls = Some(cls);
                    updated.push(Metric::Cls);
                }
            }
            PerformanceEntry::FirstInput {
                start_time,
                processing_start,
            } => {
                if self.vitals.fid.is_none() {
                    self.vitals.fid = Some((processing_start - start_time).max(0.0));
                    updated.push(Metric::Fid);
                }
            }
            PerformanceEntry::Navigation {
                response_start,
                dom_interactive,
                ..
            } => {
                if self.vitals.ttfb.is_some() {
                    self.begin_document();
                }
                self.vitals.ttfb = Some(response_start.max(0.0));
                updated.push(Metric::Ttfb);
                if dom_interactive > 0.0 {
                    self.dom_interactive = Some(dom_interactive);
                    self.update_tti(&mut updated);
                }
            }
            PerformanceEntry::Longtask {
                start_time,
                duration,
            } => {
                self.long_tasks += 1;
                let blocking = (duration - LONG_TASK_BUDGET_MS).max(0.0);
                self.vitals.tbt = Some(self.vitals.tbt.unwrap_or(0.0) + blocking);
                updated.push(Metric::Tbt);
                self.last_long_task_end = self.last_long_task_end.max(start_time + duration);
                self.update_tti(&mut updated);
            }
            PerformanceEntry::Resource {
                name,
                initiator_type,
                transfer_size,
                duration,
            } => {
                let category = ResourceCategory::classify(&initiator_type, &name);
                self.resources.add(category, transfer_size, duration);
            }
        }

        updated
            .into_iter()
            .filter_map(|metric| self.check_budget(metric))
            .collect()
    }

    /// Time to interactive: DOM interactive, pushed back by any long task
    /// that ends later.
    fn update_tti(&mut self, updated: &mut Vec<Metric>) {
        if let Some(interactive) = self.dom_interactive {
            self.vitals.tti = Some(interactive.max(self.last_long_task_end));
            updated.push(Metric::Tti);
        }
    }

    fn check_budget(&mut self, metric: Metric) -> Option<PerformanceAlert> {
        let value = self.vitals.get(metric)?;
        let (severity, threshold) = self.budgets.evaluate(metric, value)?;
        let already = self
            .alerted
            .get(&metric)
            .is_some_and(|prev| severity_rank(*prev) >= severity_rank(severity));
        if already {
            return None;
        }
        self.alerted.insert(metric, severity);

        let alert = PerformanceAlert {
            metric,
            value,
            threshold,
            severity,
            page: self.page.clone(),
            timestamp: self.clock.now(),
        };
        warn!(
            metric = metric.as_str(),
            value,
            threshold,
            severity = severity.as_str(),
            page = %self.page,
            "Performance budget exceeded"
        );
        if let Some(metrics) = &self.metrics {
            metrics.alerts_emitted.inc();
        }
        Some(alert)
    }

    /// Snapshots the current state into the capped report list.
    pub fn snapshot_report(&mut self) -> Result<PerformanceReport> {
        let report = PerformanceReport {
            id: Uuid::new_v4().to_string(),
            timestamp: self.clock.now(),
            page: self.page.clone(),
            vitals: self.vitals.clone(),
            score: quality_score(&self.vitals),
            resources: self.resources.clone(),
            network: self.network.clone(),
            long_tasks: self.long_tasks,
        };
        self.reports.push(report.clone());
        self.gateway
            .save_capped(keys::PERFORMANCE_REPORTS, &mut self.reports, MAX_PERFORMANCE_REPORTS)?;
        debug!(report_id = %report.id, score = ?report.score, "Performance report stored");
        Ok(report)
    }

    pub fn reports(&self) -> &[PerformanceReport] {
        &self.reports
    }

    pub fn export(&self, format: ExportFormat) -> Result<String> {
        export::export(&self.reports, format)
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
