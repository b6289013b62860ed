//! Where and how the server store persists.

use std::env;
use std::path::PathBuf;

use dirs::data_dir;
use serde::{Deserialize, Serialize};

use crate::persist::DEFAULT_PERSISTENCE_KEY;

const APP_DIR: &str = "launcher-state";
const DB_FILE: &str = "launcher-state.db";

/// Overrides the database file location.
pub const ENV_DATABASE_PATH: &str = "LAUNCHER_STATE_DB";
/// Overrides the persistence key.
pub const ENV_PERSISTENCE_KEY: &str = "LAUNCHER_STATE_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Key the server list snapshot is stored under.
    pub persistence_key: String,
    /// Buffered change events per subscriber.
    pub event_capacity: usize,
}

impl StoreConfig {
    pub const DEFAULT_EVENT_CAPACITY: usize = 256;

    /// Defaults with `LAUNCHER_STATE_DB` / `LAUNCHER_STATE_KEY` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|name| env::var(name).ok());
        config
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|v| !v.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(key) = lookup(ENV_PERSISTENCE_KEY).filter(|v| !v.trim().is_empty()) {
            self.persistence_key = key;
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            persistence_key: DEFAULT_PERSISTENCE_KEY.to_string(),
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// `<data dir>/launcher-state/launcher-state.db`, or the working directory
/// when the platform has no data directory.
pub fn default_database_path() -> PathBuf {
    data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DB_FILE)
}
