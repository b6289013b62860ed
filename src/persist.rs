//! Persistence adapter: the server list as one named JSON blob.
//!
//! The snapshot is stored under a single key as
//! `{"state": {"serverList": [...]}, "version": N}`. Payloads written before
//! the version field existed (or with version 0) share the same shape and
//! are read as-is.
//!
//! Writes are tagged with a sequence number taken when the state changed.
//! A write only lands if its sequence is newer than the last committed one,
//! so an older snapshot that finishes late can never overwrite a newer one.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StateError};
use crate::server::ServerList;
use crate::store::{validate_key, StateStore};

/// Key the launcher stores its server list under.
pub const DEFAULT_PERSISTENCE_KEY: &str = "/server-storage";

/// Snapshot schema written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The persisted subset of store state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerListSnapshot {
    pub server_list: ServerList,
}

impl ServerListSnapshot {
    pub fn new(server_list: ServerList) -> Self {
        Self { server_list }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    state: &'a ServerListSnapshot,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    state: serde_json::Value,
    #[serde(default)]
    version: u32,
}

/// What happened to a sequenced write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was written; carries the backend's new key version.
    Written { version: u64 },
    /// A newer snapshot had already been committed; nothing was written.
    Superseded,
}

/// Bridges a [`StateStore`] to the server list snapshot under one key.
pub struct PersistenceAdapter<S: StateStore> {
    backend: Arc<S>,
    key: String,
    issued: AtomicU64,
    committed: Mutex<u64>,
}

impl<S: StateStore> PersistenceAdapter<S> {
    /// Adapter over `backend` using [`DEFAULT_PERSISTENCE_KEY`].
    pub fn new(backend: S) -> Self {
        Self {
            backend: Arc::new(backend),
            key: DEFAULT_PERSISTENCE_KEY.to_string(),
            issued: AtomicU64::new(0),
            committed: Mutex::new(0),
        }
    }

    /// Adapter over a shared backend with a custom key.
    pub fn shared(backend: Arc<S>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self {
            backend,
            key,
            issued: AtomicU64::new(0),
            committed: Mutex::new(0),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &Arc<S> {
        &self.backend
    }

    /// Read the snapshot.
    ///
    /// An absent key is the normal cold-start case and yields `Ok(None)`.
    /// A payload that is present but unreadable is a corruption error.
    pub async fn load(&self) -> Result<Option<ServerListSnapshot>> {
        let Some(entry) = self.backend.get(&self.key).await? else {
            debug!(key = %self.key, "no persisted server list");
            return Ok(None);
        };

        let snapshot = self.decode(&entry.value)?;
        debug!(
            key = %self.key,
            servers = snapshot.server_list.len(),
            "loaded server list snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Serialize and write the snapshot, overwriting the key.
    pub async fn save(&self, snapshot: &ServerListSnapshot) -> Result<()> {
        let sequence = self.next_sequence();
        self.save_sequenced(sequence, snapshot).await.map(|_| ())
    }

    /// Remove the persisted snapshot.
    pub async fn clear(&self) -> Result<()> {
        // Fence off writes issued before the clear.
        let sequence = self.next_sequence();
        let mut committed = self.committed.lock().await;
        self.backend.delete(&self.key).await?;
        *committed = (*committed).max(sequence);
        debug!(key = %self.key, "cleared server list snapshot");
        Ok(())
    }

    /// Reserve the sequence number for a write of the current state.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Write `snapshot` unless a newer sequence has already been committed.
    pub(crate) async fn save_sequenced(
        &self,
        sequence: u64,
        snapshot: &ServerListSnapshot,
    ) -> Result<SaveOutcome> {
        let bytes = self.encode(snapshot)?;

        let mut committed = self.committed.lock().await;
        if sequence <= *committed {
            debug!(
                key = %self.key,
                sequence,
                committed = *committed,
                "skipping stale server list write"
            );
            return Ok(SaveOutcome::Superseded);
        }

        let version = self.backend.set(&self.key, bytes).await?;
        *committed = sequence;
        debug!(
            key = %self.key,
            sequence,
            version,
            servers = snapshot.server_list.len(),
            "persisted server list"
        );
        Ok(SaveOutcome::Written { version })
    }

    fn encode(&self, snapshot: &ServerListSnapshot) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            state: snapshot,
            version: CURRENT_SCHEMA_VERSION,
        };
        serde_json::to_vec(&envelope).map_err(Into::into)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ServerListSnapshot> {
        let corrupt = |reason: String| StateError::CorruptSnapshot {
            key: self.key.clone(),
            reason,
        };

        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;

        if envelope.version > CURRENT_SCHEMA_VERSION {
            return Err(StateError::UnsupportedSchemaVersion {
                found: envelope.version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        // Version 0 and 1 share a shape; `favorite` defaults when missing.
        serde_json::from_value(envelope.state).map_err(|e| corrupt(e.to_string()))
    }
}
