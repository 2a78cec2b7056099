//! Performance monitoring for the analytics engine.
//!
//! Host timing entries flow into a [`PerformanceMonitor`], which keeps the
//! web vitals current, returns budget alerts for the engine to publish and
//! takes periodic [`PerformanceReport`] snapshots.

pub mod budget;
pub mod entry;
pub mod monitor;
pub mod report;
pub mod score;

pub use budget::{default_budgets, Budgets};
pub use entry::{
    EntryKind, HostPerformanceSource, NetworkInfo, NoopPerformanceSource, PerformanceEntry,
    PerformanceSource,
};
pub use monitor::{PerformanceConfig, PerformanceMonitor};
pub use report::{PerformanceReport, ResourceBreakdown, ResourceCategory};
pub use score::quality_score;
