//! StateStore trait - the storage backend capability.
//!
//! Anything that can get, set and delete opaque values by string key can back
//! the server store: an embedded database, a file-backed map, an OS keychain.
//! Keys are path-like (`/server-storage`) and values are opaque bytes.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{Result, StateError};

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// A stored entry with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// The key.
    pub key: String,
    /// The value (opaque bytes).
    pub value: Vec<u8>,
    /// Monotonically increasing version (per key).
    pub version: u64,
    /// When the entry was created.
    pub created_at: SystemTime,
    /// When the entry was last updated.
    pub updated_at: SystemTime,
}

impl Entry {
    /// Deserialize the value as JSON.
    pub fn value_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.value).map_err(Into::into)
    }
}

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StateError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StateError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if !key.starts_with('/') {
        return Err(StateError::InvalidKey(
            "key must start with '/'".to_string(),
        ));
    }
    Ok(())
}

/// The storage backend trait.
///
/// All operations may suspend and may fail. No atomicity is promised across
/// keys. Code should depend on this trait, not specific implementations.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get an entry by key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Get an entry and deserialize as JSON.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(entry) => {
                let value: T = serde_json::from_slice(&entry.value)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a key to a value.
    ///
    /// Creates the key if it doesn't exist, or overwrites it if it does.
    /// Returns the new version number.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64>;

    /// Set a key to a JSON-encoded value.
    async fn set_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<u64> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes).await
    }

    /// Delete a key.
    ///
    /// Returns `Ok(())` if the key was deleted or didn't exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys matching a prefix, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Get the current version of a key (0 if not exists).
    async fn version(&self, key: &str) -> Result<u64> {
        Ok(self.get(key).await?.map(|e| e.version).unwrap_or(0))
    }
}
