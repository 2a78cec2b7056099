//! Background timers for the analytics engine.
//!
//! Every recurring job (persistence flush, performance reports, session
//! timeout checks, synthetic transport traffic) runs on a named tokio task
//! owned by a [`WorkerScheduler`], so tearing a component down aborts its
//! timers synchronously.

pub mod scheduler;

pub use scheduler::*;
