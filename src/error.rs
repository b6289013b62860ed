//! Error types for the server store and its storage backends.
//!
//! Backend failures (connection, quota, database) are kept distinct from
//! snapshot corruption so callers can tell "no data" from "bad data".

use thiserror::Error;

use crate::server::{SteamId, ValidationError};

/// Errors that can occur while storing, loading or mutating server state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Cannot connect to or communicate with storage backend.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Storage is full or over quota.
    #[error("storage full: {0}")]
    StorageFull(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The payload stored under the persistence key does not decode as a
    /// server list snapshot.
    #[error("corrupt snapshot at {key}: {reason}")]
    CorruptSnapshot { key: String, reason: String },

    /// The snapshot was written by a newer schema than this build understands.
    #[error("unsupported snapshot schema version {found} (supported up to {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    /// No server with this steamid is known to the store.
    #[error("server not found: {0}")]
    ServerNotFound(SteamId),

    /// A server list contained the same steamid twice.
    #[error("duplicate steamid in server list: {0}")]
    DuplicateSteamId(SteamId),

    /// A UI row failed schema validation.
    #[error("invalid server record: {0}")]
    Validation(#[from] ValidationError),

    /// A background persistence task panicked or was cancelled.
    #[error("persistence task failed: {0}")]
    PersistenceTask(String),

    /// The launch collaborator refused or failed to start the game.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    /// Returns true if this error is a transient backend failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StateError::ConnectionError(_) | StateError::PersistenceTask(_)
        )
    }

    /// Returns true if the persisted payload exists but cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StateError::CorruptSnapshot { .. } | StateError::UnsupportedSchemaVersion { .. }
        )
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::SerializationError(err.to_string())
    }
}
