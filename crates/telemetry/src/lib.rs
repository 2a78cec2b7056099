//! Internal telemetry for the analytics engine.
//!
//! Structured logging setup plus per-engine health and counters. Nothing
//! here is global: the engine owns one [`HealthRegistry`] and one
//! [`Metrics`] and hands out shared references.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
