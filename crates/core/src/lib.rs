//! Core types, limits, and validation for the behavioral analytics engine.

pub mod analytics;
pub mod clock;
pub mod error;
pub mod events;
pub mod experiment;
pub mod goals;
pub mod heatmap;
pub mod limits;
pub mod message;
pub mod performance;
pub mod session;

pub use analytics::*;
pub use clock::*;
pub use error::{Error, Result, TransportErrorCode};
pub use events::*;
pub use experiment::*;
pub use goals::*;
pub use heatmap::*;
pub use message::*;
pub use performance::*;
pub use session::*;
