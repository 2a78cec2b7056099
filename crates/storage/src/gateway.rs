//! Local persistence gateway.
//!
//! Loads and saves namespaced JSON blobs. Loads never fail: a missing key or
//! a blob that no longer deserializes yields the type's default and a
//! warning. Lists written through [`PersistenceGateway::append_capped`] are
//! trimmed after every append.

use engine_core::limits::trim_to_cap;
use engine_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::store::{KeyValueStore, StorageChange};

/// Namespaced JSON access to a shared key-value store.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Full store key for a logical name.
    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.namespace, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Loads a blob, falling back to `T::default()` on any failure.
    pub fn load<T>(&self, name: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        self.try_load(name).unwrap_or_default()
    }

    /// Loads a blob if it exists and parses.
    pub fn try_load<T>(&self, name: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let key = self.key(name);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read from store");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable stored value");
                None
            }
        }
    }

    /// Serializes and writes a blob.
    pub fn save<T>(&self, name: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self.key(name);
        let raw = serde_json::to_string(value).map_err(Error::Serialization)?;
        self.store.set(&key, &raw)?;
        debug!(key = %key, bytes = raw.len(), "Saved blob");
        Ok(())
    }

    /// Trims `items` to `cap` (most recent kept) and writes them.
    pub fn save_capped<T>(&self, name: &str, items: &mut Vec<T>, cap: usize) -> Result<()>
    where
        T: Serialize,
    {
        trim_to_cap(items, cap);
        self.save(name, items)
    }

    /// Appends one item to a stored list, trims it to `cap` and writes it
    /// back. Returns the resulting length.
    pub fn append_capped<T>(&self, name: &str, item: T, cap: usize) -> Result<usize>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut items: Vec<T> = self.load(name);
        items.push(item);
        self.save_capped(name, &mut items, cap)?;
        Ok(items.len())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.store.remove(&self.key(name))
    }

    /// Logical names under this namespace starting with `prefix`.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let full = self.key(prefix);
        let strip = self.namespace.len() + 1;
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&full))
                .map(|k| k[strip..].to_string())
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list store keys");
                Vec::new()
            }
        }
    }

    /// Change feed of the underlying store, if it has one.
    pub fn watch(&self) -> Option<broadcast::Receiver<StorageChange>> {
        self.store.watch()
    }

    /// Writes and reads back a probe key.
    pub fn check(&self) -> bool {
        let key = self.key("__probe");
        let ok = self.store.set(&key, "1").is_ok()
            && matches!(self.store.get(&key), Ok(Some(v)) if v == "1");
        let _ = self.store.remove(&key);
        ok
    }
}
