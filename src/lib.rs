//! # launcher-state
//!
//! Known/favorite game-server store for the launcher, persisted across
//! restarts through a pluggable key-value backend.
//!
//! - **Server store**: ordered, steamid-unique server list with synchronous
//!   in-memory mutation and background persistence
//! - **Persistence adapter**: the list as one versioned JSON snapshot under a
//!   single key, with stale writes fenced off by sequence number
//! - **Hydration**: an explicit startup step that loads the snapshot
//! - **Row validation**: one parser for untyped table rows, used by the play
//!   action
//!
//! ## Backends
//!
//! - [`SqliteStore`]: Embedded SQLite database (default, durable)
//! - [`MemoryStore`]: In-memory store (testing and ephemeral sessions)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use launcher_state::{hydrate, ServerList, ServerStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> launcher_state::Result<()> {
//!     let store = ServerStore::open(&StoreConfig::from_env()).await?;
//!     hydrate(&store).await?;
//!
//!     for server in store.server_list().iter() {
//!         println!("{} {} ({} players)", server.name, server.connect_address(), server.players);
//!     }
//!
//!     // Memory changes now; the write lands in the background.
//!     store.set_server_list(ServerList::new()).wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hydrate;
pub mod memory;
pub mod persist;
pub mod play;
pub mod server;
pub mod server_store;
pub mod sqlite;
pub mod store;
pub mod watch;

// Re-export main types
pub use config::StoreConfig;
pub use error::{Result, StateError};
pub use hydrate::{hydrate, Hydration};
pub use memory::MemoryStore;
pub use persist::{
    PersistenceAdapter, SaveOutcome, ServerListSnapshot, CURRENT_SCHEMA_VERSION,
    DEFAULT_PERSISTENCE_KEY,
};
pub use play::{play_row, Confirm, Launcher, PlayOutcome};
pub use server::{parse_server, Server, ServerList, SteamId, ValidationError};
pub use server_store::{PendingWrite, ServerStore};
pub use sqlite::SqliteStore;
pub use store::{Entry, StateStore, MAX_KEY_LENGTH};
pub use watch::{EventType, ServerListStream, StoreEvent};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, StateError};
    pub use crate::hydrate::{hydrate, Hydration};
    pub use crate::memory::MemoryStore;
    pub use crate::persist::PersistenceAdapter;
    pub use crate::server::{Server, ServerList, SteamId};
    pub use crate::server_store::ServerStore;
    pub use crate::sqlite::SqliteStore;
    pub use crate::store::StateStore;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backed_store_basic() {
        let store = ServerStore::new(PersistenceAdapter::new(MemoryStore::new()));
        assert_eq!(hydrate(&store).await.unwrap(), Hydration::Empty);
        assert!(store.is_hydrated());
    }

    #[test]
    fn test_stores_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<MemoryStore>();
        assert_send_sync::<SqliteStore>();
        assert_send_sync::<ServerStore<MemoryStore>>();
    }
}
