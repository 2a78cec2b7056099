//! Worker scheduler for recurring background jobs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Persistence flush interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Performance report snapshot interval in milliseconds
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Session inactivity check interval in milliseconds
    #[serde(default = "default_timeout_check_interval_ms")]
    pub timeout_check_interval_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_report_interval_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_timeout_check_interval_ms() -> u64 {
    60_000 // 1 minute
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
            timeout_check_interval_ms: default_timeout_check_interval_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn timeout_check_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_check_interval_ms)
    }
}

struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// A set of named recurring timers.
///
/// The first tick fires one full period after scheduling. Dropping the
/// scheduler aborts every task it owns.
#[derive(Default)]
pub struct WorkerScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl WorkerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` every `period`. A zero period schedules nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn every<F>(&self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.every_async(name, period, move || {
            job();
            async {}
        });
    }

    /// Runs an async `job` every `period`, awaiting each run before the
    /// next tick.
    pub fn every_async<F, Fut>(&self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            debug!(worker = name, "Zero period, not scheduling");
            return;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                job().await;
            }
        });

        let mut tasks = self.tasks.lock();
        if let Some(pos) = tasks.iter().position(|t| t.name == name) {
            let old = tasks.swap_remove(pos);
            old.handle.abort();
        }
        tasks.push(ScheduledTask { name, handle });
        info!(worker = name, period_ms = period.as_millis() as u64, "Worker started");
    }

    /// Stops one named timer. Returns false if it was not running.
    pub fn stop(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.iter().position(|t| t.name == name) {
            Some(pos) => {
                tasks.swap_remove(pos).handle.abort();
                debug!(worker = name, "Worker stopped");
                true
            }
            None => false,
        }
    }

    /// Aborts every timer.
    pub fn stop_all(&self) {
        let tasks: Vec<ScheduledTask> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in &tasks {
            task.handle.abort();
        }
        info!(count = tasks.len(), "Workers stopped");
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.lock().iter().any(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.handle.abort();
        }
    }
}
