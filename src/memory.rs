//! In-memory state store implementation.
//!
//! This backend is NOT durable - data is lost on process exit. It backs
//! tests and launcher sessions that should leave nothing on disk.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::Result;
use crate::store::{validate_key, Entry, StateStore};

/// In-memory implementation of StateStore.
///
/// Uses a BTreeMap for ordered key iteration and RwLock for concurrency.
/// Cloning shares the underlying map, so a clone can stand in for "the same
/// disk" across two store instances in restart tests.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Get the number of entries in the store.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        validate_key(key)?;

        let mut data = self.data.write();
        let now = SystemTime::now();

        let (new_version, created_at) = match data.get(key) {
            Some(existing) => (existing.version + 1, existing.created_at),
            None => (1, now),
        };

        data.insert(
            key.to_string(),
            Entry {
                key: key.to_string(),
                value,
                version: new_version,
                created_at,
                updated_at: now,
            },
        );

        Ok(new_version)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.data.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read();
        let keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys)
    }
}
