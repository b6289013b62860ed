//! Explicit hydration of a [`ServerStore`] from durable storage.
//!
//! Construction of the store is synchronous and touches no storage; the UI
//! calls [`hydrate`] once at startup and checks
//! [`ServerStore::is_hydrated`] before trusting the list as complete.

use tracing::info;

use crate::error::Result;
use crate::server_store::ServerStore;
use crate::store::StateStore;

/// What hydration found in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// A snapshot was loaded.
    Restored { servers: usize },
    /// Nothing was persisted yet; the list was left as it was.
    Empty,
}

/// Load the persisted server list into `store`.
///
/// Hydration only reads: the loaded list is not written back. Backend and
/// corruption errors are returned as-is and leave the store un-hydrated, so
/// a damaged snapshot is never mistaken for an empty one.
pub async fn hydrate<S: StateStore + 'static>(store: &ServerStore<S>) -> Result<Hydration> {
    let snapshot = store.adapter().load().await?;

    let outcome = match snapshot {
        Some(snapshot) => {
            let servers = snapshot.server_list.len();
            store.restore(Some(snapshot.server_list));
            Hydration::Restored { servers }
        }
        None => {
            store.restore(None);
            Hydration::Empty
        }
    };

    info!(key = store.adapter().key(), ?outcome, "server store hydrated");
    Ok(outcome)
}
