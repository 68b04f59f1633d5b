//! Durable local store
//!
//! A small key-value layer for state that must survive restarts, such as the
//! search queue. Values are opaque text blobs keyed by a fixed namespace
//! string; callers own the format and must tolerate absent or malformed data.
//!
//! - `FileStore`: one file per key under the data directory
//! - `MemoryStore`: in-process map, for tests and ephemeral sessions

pub mod error;
pub mod file;

use std::collections::HashMap;
use std::sync::Mutex;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;

/// Key-value persistence surviving restarts
pub trait DurableStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    fn save(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Load the value under `key`, or `None` if nothing was saved
    fn load(&self, key: &str) -> StoreResult<Option<String>>;

    /// Forget the value under `key`
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory durable store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, as if it had been saved by an earlier session
    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl DurableStore for MemoryStore {
    fn save(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}
