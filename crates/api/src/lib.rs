//! Public surface of the analytics engine.
//!
//! [`AnalyticsEngine`] ties capture, experiments, performance monitoring,
//! goals and the transport together behind one set of tracking calls.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::AnalyticsEngine;
