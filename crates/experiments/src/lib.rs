//! A/B testing for the analytics engine.

pub mod coordinator;
pub mod report;

pub use coordinator::{AbTestCoordinator, Assignment, ExperimentsConfig};
pub use report::{build_report, TestReport, VariantReport};
