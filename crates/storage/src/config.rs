//! Storage configuration.

use serde::{Deserialize, Serialize};

/// Which key-value backend holds the persisted blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process map; contents vanish with the process
    Memory,
    /// One JSON file per key under `dir`
    File { dir: String },
}

/// Persistence gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Prefix applied to every key
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_namespace() -> String {
    "analytics".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            namespace: default_namespace(),
        }
    }
}
