//! Local persistence gateway for the analytics engine.

pub mod config;
pub mod export;
pub mod gateway;
pub mod keys;
pub mod store;

pub use config::*;
pub use export::{CsvRecord, ExportFormat};
pub use gateway::PersistenceGateway;
pub use store::*;

use engine_core::Result;
use std::sync::Arc;

/// Opens the backend described by `config`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match &config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File { dir } => Ok(Arc::new(FileStore::open(dir)?)),
    }
}
