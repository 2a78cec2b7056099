//! Per-engine counters, gauges and the storage flush histogram.
//!
//! Counters are owned by the engine instance and read through
//! [`Metrics::snapshot`]; nothing is exported to an external system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

}

/// Last observed level, e.g. queued messages or visitors online.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bucket bounds for local storage flushes, in milliseconds. Anything above
/// the last bound lands in an overflow bucket.
pub const FLUSH_BUCKETS_MS: &[u64] = &[1, 2, 5, 10, 20, 50, 100, 250, 1_000];

/// Fixed-bucket latency histogram.
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [u64],
    /// One slot per bound plus the overflow slot
    counts: Vec<AtomicU64>,
    sum: AtomicU64,
    max: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_bounds(FLUSH_BUCKETS_MS)
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// `bounds` must be sorted ascending.
    pub fn with_bounds(bounds: &'static [u64]) -> Self {
        Self {
            bounds,
            counts: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            sum: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        let slot = self.bounds.partition_point(|&bound| bound < ms);
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.max.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// Upper bound of the bucket holding the `q` quantile (0.0..=1.0).
    /// Values in the overflow bucket report the observed maximum.
    pub fn quantile(&self, q: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }
        let rank = ((q.clamp(0.0, 1.0) * total as f64).ceil() as u64).max(1);
        let mut seen = 0;
        for (slot, count) in self.counts.iter().enumerate() {
            seen += count.load(Ordering::Relaxed);
            if seen >= rank {
                return self.bounds.get(slot).copied().unwrap_or_else(|| self.max());
            }
        }
        self.max()
    }
}

/// Collected metrics for one engine instance.
#[derive(Debug, Default)]
pub struct Metrics {
    // Capture
    pub events_captured: Counter,
    pub events_throttled: Counter,
    pub events_rejected: Counter,
    pub sessions_ended: Counter,

    // Tracking surface
    pub tracking_calls: Counter,

    // Transport
    pub messages_sent: Counter,
    pub messages_received: Counter,
    pub reconnect_attempts: Counter,

    // Derived signals
    pub alerts_emitted: Counter,
    pub goal_completions: Counter,

    // Storage
    pub storage_writes: Counter,
    pub storage_errors: Counter,
    pub flush_latency_ms: Histogram,

    // Gauges
    pub queue_depth: Gauge,
    pub active_visitors: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Point-in-time copy of every counter, for status logs and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_captured: u64,
    pub events_throttled: u64,
    pub events_rejected: u64,
    pub sessions_ended: u64,
    pub tracking_calls: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_attempts: u64,
    pub alerts_emitted: u64,
    pub goal_completions: u64,
    pub storage_writes: u64,
    pub storage_errors: u64,
    pub flush_latency_mean_ms: f64,
    pub flush_latency_p95_ms: u64,
    pub queue_depth: u64,
    pub active_visitors: u64,
}

impl Metrics {
    /// Reads every counter once; values are not mutually consistent.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_captured: self.events_captured.get(),
            events_throttled: self.events_throttled.get(),
            events_rejected: self.events_rejected.get(),
            sessions_ended: self.sessions_ended.get(),
            tracking_calls: self.tracking_calls.get(),
            messages_sent: self.messages_sent.get(),
            messages_received: self.messages_received.get(),
            reconnect_attempts: self.reconnect_attempts.get(),
            alerts_emitted: self.alerts_emitted.get(),
            goal_completions: self.goal_completions.get(),
            storage_writes: self.storage_writes.get(),
            storage_errors: self.storage_errors.get(),
            flush_latency_mean_ms: self.flush_latency_ms.mean(),
            flush_latency_p95_ms: self.flush_latency_ms.quantile(0.95),
            queue_depth: self.queue_depth.get(),
            active_visitors: self.active_visitors.get(),
        }
    }
}
