//! The in-memory server list and its mutation operations.
//!
//! Every mutation updates memory synchronously and then persists the new
//! list on a background task. The returned [`PendingWrite`] may be awaited
//! for durability or dropped for fire-and-forget behavior; either way the
//! in-memory list stays authoritative when the backend fails.
//!
//! Writes run on the tokio runtime that was current when the store was
//! built, or on the caller's runtime otherwise. With neither, the mutation
//! still applies in memory and its [`PendingWrite`] reports
//! [`StateError::PersistenceTask`].

use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StateError};
use crate::persist::{PersistenceAdapter, SaveOutcome, ServerListSnapshot};
use crate::server::{Server, ServerList, SteamId};
use crate::sqlite::SqliteStore;
use crate::store::StateStore;
use crate::watch::{EventType, ServerListStream, StoreEvent, WatchSender};

/// The durability tail of a mutation.
#[must_use = "dropping a PendingWrite is fire-and-forget; call wait() to observe failures"]
pub struct PendingWrite {
    task: WriteTask,
}

enum WriteTask {
    Spawned(JoinHandle<Result<SaveOutcome>>),
    NoRuntime,
}

impl PendingWrite {
    /// Wait for the write to land (or be superseded by a newer one).
    pub async fn wait(self) -> Result<SaveOutcome> {
        match self.task {
            WriteTask::Spawned(handle) => handle
                .await
                .map_err(|e| StateError::PersistenceTask(e.to_string()))?,
            WriteTask::NoRuntime => Err(StateError::PersistenceTask(
                "no tokio runtime available to persist the server list".to_string(),
            )),
        }
    }
}

/// Known/favorite servers, persisted through a [`PersistenceAdapter`].
pub struct ServerStore<S: StateStore + 'static> {
    list: RwLock<Arc<ServerList>>,
    hydrated: AtomicBool,
    adapter: Arc<PersistenceAdapter<S>>,
    watcher: WatchSender,
    runtime: Option<Handle>,
}

impl<S: StateStore + 'static> ServerStore<S> {
    /// Create an empty, not yet hydrated store.
    pub fn new(adapter: PersistenceAdapter<S>) -> Self {
        Self::with_capacity(adapter, StoreConfig::DEFAULT_EVENT_CAPACITY)
    }

    /// Create a store whose event channel buffers `event_capacity` events.
    ///
    /// Background writes are bound to the runtime current at this call, if any.
    pub fn with_capacity(adapter: PersistenceAdapter<S>, event_capacity: usize) -> Self {
        Self {
            list: RwLock::new(Arc::new(ServerList::new())),
            hydrated: AtomicBool::new(false),
            adapter: Arc::new(adapter),
            watcher: WatchSender::new(event_capacity),
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn adapter(&self) -> &PersistenceAdapter<S> {
        &self.adapter
    }

    /// The current list. Cheap: clones a reference, not the servers.
    pub fn server_list(&self) -> Arc<ServerList> {
        Arc::clone(&self.list.read())
    }

    /// Look up one server by steamid.
    pub fn find(&self, steamid: &SteamId) -> Option<Server> {
        self.list.read().get(steamid).cloned()
    }

    /// Whether persisted state has been loaded. Until then the list may be
    /// incomplete.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::Acquire)
    }

    /// Subscribe to list changes from now on.
    pub fn subscribe(&self) -> ServerListStream {
        self.watcher.subscribe()
    }

    /// Replace the whole list.
    pub fn set_server_list(&self, list: ServerList) -> PendingWrite {
        let mut guard = self.list.write();
        let event = StoreEvent::list(EventType::Replaced, list.len());
        *guard = Arc::new(list);
        self.commit(guard, event)
    }

    /// Replace the server with the same steamid, keeping its position.
    ///
    /// An unknown steamid leaves the list untouched, writes nothing and
    /// returns [`StateError::ServerNotFound`].
    pub fn update_server(&self, server: Server) -> Result<PendingWrite> {
        let mut guard = self.list.write();
        let Some(index) = guard.position(&server.steamid) else {
            debug!(steamid = %server.steamid, "update for unknown server ignored");
            return Err(StateError::ServerNotFound(server.steamid));
        };

        let steamid = server.steamid.clone();
        let list = Arc::make_mut(&mut *guard);
        list.replace(server);
        debug!(%steamid, index, "server updated");

        let event = StoreEvent::server(EventType::Updated, steamid, list.len());
        Ok(self.commit(guard, event))
    }

    /// Replace the server in place, or append it when its steamid is new.
    pub fn upsert_server(&self, server: Server) -> PendingWrite {
        let mut guard = self.list.write();
        let steamid = server.steamid.clone();
        let list = Arc::make_mut(&mut *guard);

        let event_type = if list.upsert(server) {
            EventType::Inserted
        } else {
            EventType::Updated
        };

        let event = StoreEvent::server(event_type, steamid, list.len());
        self.commit(guard, event)
    }

    /// Remove a server from the list.
    pub fn remove_server(&self, steamid: &SteamId) -> Result<PendingWrite> {
        let mut guard = self.list.write();
        if guard.position(steamid).is_none() {
            return Err(StateError::ServerNotFound(steamid.clone()));
        }

        let list = Arc::make_mut(&mut *guard);
        list.remove(steamid);
        let event = StoreEvent::server(EventType::Removed, steamid.clone(), list.len());
        Ok(self.commit(guard, event))
    }

    /// Flip the client-side favorite flag of a server.
    pub fn toggle_favorite(&self, steamid: &SteamId) -> Result<PendingWrite> {
        let mut guard = self.list.write();
        if guard.position(steamid).is_none() {
            return Err(StateError::ServerNotFound(steamid.clone()));
        }

        let list = Arc::make_mut(&mut *guard);
        if let Some(server) = list.get_mut(steamid) {
            server.favorite = !server.favorite;
        }
        let event = StoreEvent::server(EventType::Updated, steamid.clone(), list.len());
        Ok(self.commit(guard, event))
    }

    /// Write the current list and wait for it.
    pub async fn persist(&self) -> Result<()> {
        let (sequence, current) = {
            let guard = self.list.read();
            (self.adapter.next_sequence(), Arc::clone(&guard))
        };
        let snapshot = ServerListSnapshot::new(ServerList::clone(&current));
        self.adapter.save_sequenced(sequence, &snapshot).await?;
        Ok(())
    }

    /// Install hydrated state without writing it back.
    pub(crate) fn restore(&self, list: Option<ServerList>) {
        let len = {
            let mut guard = self.list.write();
            if let Some(list) = list {
                *guard = Arc::new(list);
            }
            guard.len()
        };
        self.hydrated.store(true, Ordering::Release);
        self.watcher.send(StoreEvent::list(EventType::Hydrated, len));
    }

    /// Take the write sequence while still holding the lock, so sequence
    /// order matches mutation order, then persist in the background.
    fn commit(&self, guard: RwLockWriteGuard<'_, Arc<ServerList>>, event: StoreEvent) -> PendingWrite {
        let sequence = self.adapter.next_sequence();
        let current = Arc::clone(&guard);
        drop(guard);

        self.watcher.send(event);
        self.spawn_save(sequence, current)
    }

    fn spawn_save(&self, sequence: u64, list: Arc<ServerList>) -> PendingWrite {
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!(
                key = self.adapter.key(),
                sequence,
                "no tokio runtime; server list kept in memory only"
            );
            return PendingWrite {
                task: WriteTask::NoRuntime,
            };
        };

        let adapter = Arc::clone(&self.adapter);
        let handle = runtime.spawn(async move {
            let snapshot = ServerListSnapshot::new(ServerList::clone(&list));
            let result = adapter.save_sequenced(sequence, &snapshot).await;
            if let Err(err) = &result {
                warn!(
                    key = adapter.key(),
                    sequence,
                    error = %err,
                    "failed to persist server list; in-memory state kept"
                );
            }
            result
        });
        PendingWrite {
            task: WriteTask::Spawned(handle),
        }
    }
}

impl ServerStore<SqliteStore> {
    /// Open the SQLite-backed store described by `config`.
    ///
    /// The store comes back empty; call [`crate::hydrate`] before the first
    /// read that needs the persisted list.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(dir) = config
            .database_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(dir).await?;
        }

        let backend = SqliteStore::open(&config.database_path).await?;
        let adapter = PersistenceAdapter::shared(Arc::new(backend), config.persistence_key.clone())?;
        Ok(Self::with_capacity(adapter, config.event_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::{hydrate, Hydration};
    use crate::memory::MemoryStore;
    use crate::server::test_server;
    use crate::store::Entry;
    use async_trait::async_trait;
    use tokio_stream::StreamExt;

    fn store_over(backend: MemoryStore) -> ServerStore<MemoryStore> {
        ServerStore::new(PersistenceAdapter::new(backend))
    }

    fn list_of(names: &[(&str, &str)]) -> ServerList {
        ServerList::try_from(
            names
                .iter()
                .map(|(id, name)| test_server(id, name))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn names(list: &ServerList) -> Vec<String> {
        list.iter().map(|s| s.name.clone()).collect()
    }

    /// Backend that is always unavailable.
    struct UnavailableStore;

    #[async_trait]
    impl StateStore for UnavailableStore {
        async fn get(&self, _key: &str) -> Result<Option<Entry>> {
            Err(StateError::ConnectionError("storage offline".to_string()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<u64> {
            Err(StateError::ConnectionError("storage offline".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(StateError::ConnectionError("storage offline".to_string()))
        }

        async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(StateError::ConnectionError("storage offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_starts_empty_and_not_hydrated() {
        let store = store_over(MemoryStore::new());
        assert!(store.server_list().is_empty());
        assert!(!store.is_hydrated());
    }

    #[tokio::test]
    async fn test_set_then_get_is_immediate() {
        let store = store_over(MemoryStore::new());
        let list = list_of(&[("1", "Alpha"), ("2", "Beta")]);

        let pending = store.set_server_list(list.clone());
        assert_eq!(*store.server_list(), list);

        pending.wait().await.unwrap();
        let persisted = store.adapter().load().await.unwrap().unwrap();
        assert_eq!(persisted.server_list, list);
    }

    #[tokio::test]
    async fn test_rename_scenario_keeps_order() {
        let store = store_over(MemoryStore::new());
        let _ = store.set_server_list(list_of(&[("1", "Alpha"), ("2", "Beta")]));

        let pending = store
            .update_server(test_server("2", "Beta-Renamed"))
            .unwrap();

        assert_eq!(names(&store.server_list()), ["Alpha", "Beta-Renamed"]);
        pending.wait().await.unwrap();

        let persisted = store.adapter().load().await.unwrap().unwrap();
        assert_eq!(names(&persisted.server_list), ["Alpha", "Beta-Renamed"]);
    }

    #[tokio::test]
    async fn test_update_unknown_server_is_rejected_noop() {
        let backend = MemoryStore::new();
        let store = store_over(backend.clone());
        store
            .set_server_list(list_of(&[("1", "Alpha")]))
            .wait()
            .await
            .unwrap();
        let version_before = backend.version("/server-storage").await.unwrap();

        let err = store.update_server(test_server("2", "Beta")).err().unwrap();
        assert!(matches!(err, StateError::ServerNotFound(id) if id.as_str() == "2"));
        assert_eq!(names(&store.server_list()), ["Alpha"]);
        assert_eq!(backend.version("/server-storage").await.unwrap(), version_before);
    }

    #[tokio::test]
    async fn test_upsert_inserts_unknown_and_updates_known() {
        let store = store_over(MemoryStore::new());
        let _ = store.set_server_list(list_of(&[("1", "Alpha")]));

        let _ = store.upsert_server(test_server("2", "Beta"));
        store
            .upsert_server(test_server("1", "Alpha-2"))
            .wait()
            .await
            .unwrap();

        assert_eq!(names(&store.server_list()), ["Alpha-2", "Beta"]);
        let persisted = store.adapter().load().await.unwrap().unwrap();
        assert_eq!(names(&persisted.server_list), ["Alpha-2", "Beta"]);
    }

    #[tokio::test]
    async fn test_remove_and_toggle_favorite() {
        let store = store_over(MemoryStore::new());
        let _ = store.set_server_list(list_of(&[("1", "Alpha"), ("2", "Beta")]));

        let _ = store.toggle_favorite(&SteamId::from("2")).unwrap();
        assert!(store.find(&SteamId::from("2")).unwrap().favorite);

        store
            .remove_server(&SteamId::from("1"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(names(&store.server_list()), ["Beta"]);

        assert!(matches!(
            store.remove_server(&SteamId::from("1")),
            Err(StateError::ServerNotFound(_))
        ));
        assert!(matches!(
            store.toggle_favorite(&SteamId::from("404")),
            Err(StateError::ServerNotFound(_))
        ));

        let persisted = store.adapter().load().await.unwrap().unwrap();
        assert_eq!(persisted.server_list.favorites().count(), 1);
    }

    #[tokio::test]
    async fn test_rapid_replacements_persist_latest() {
        let store = store_over(MemoryStore::new());

        let first = store.set_server_list(list_of(&[("1", "Alpha")]));
        let second = store.set_server_list(list_of(&[("1", "Alpha"), ("2", "Beta")]));
        let third = store.set_server_list(list_of(&[("3", "Gamma")]));

        // Await out of issue order; the newest snapshot must win regardless.
        third.wait().await.unwrap();
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        let persisted = store.adapter().load().await.unwrap().unwrap();
        assert_eq!(names(&persisted.server_list), ["Gamma"]);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_memory_authoritative() {
        let store = ServerStore::new(PersistenceAdapter::new(UnavailableStore));
        let list = list_of(&[("1", "Alpha")]);

        let err = store.set_server_list(list.clone()).wait().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(*store.server_list(), list);

        let err = store.persist().await.unwrap_err();
        assert!(matches!(err, StateError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_restart_restores_list() {
        let disk = MemoryStore::new();

        {
            let store = store_over(disk.clone());
            let _ = store.set_server_list(list_of(&[("1", "Alpha"), ("2", "Beta")]));
            store
                .update_server(test_server("2", "Beta-Renamed"))
                .unwrap()
                .wait()
                .await
                .unwrap();
        }

        let store = store_over(disk);
        assert!(store.server_list().is_empty());
        let outcome = hydrate(&store).await.unwrap();

        assert_eq!(outcome, Hydration::Restored { servers: 2 });
        assert_eq!(names(&store.server_list()), ["Alpha", "Beta-Renamed"]);
    }

    #[tokio::test]
    async fn test_subscribers_see_mutations() {
        let store = store_over(MemoryStore::new());
        let mut events = store.subscribe();

        let _ = store.set_server_list(list_of(&[("1", "Alpha")]));
        let _ = store.upsert_server(test_server("2", "Beta"));
        let _ = store.update_server(test_server("9", "Nope"));

        let event = events.next().await.unwrap();
        assert_eq!(event, StoreEvent::list(EventType::Replaced, 1));

        let event = events.next().await.unwrap();
        assert_eq!(
            event,
            StoreEvent::server(EventType::Inserted, SteamId::from("2"), 2)
        );
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot() {
        let store = store_over(MemoryStore::new());
        let _ = store.set_server_list(list_of(&[("1", "Alpha")]));

        let before = store.server_list();
        let _ = store.update_server(test_server("1", "Alpha-2")).unwrap();

        assert_eq!(names(&before), ["Alpha"]);
        assert_eq!(names(&store.server_list()), ["Alpha-2"]);
    }

    #[test]
    fn test_mutation_without_runtime_stays_in_memory() {
        let store = store_over(MemoryStore::new());
        let list = list_of(&[("1", "Alpha")]);

        let pending = store.set_server_list(list.clone());
        assert_eq!(*store.server_list(), list);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let err = rt.block_on(pending.wait()).unwrap_err();
        assert!(matches!(err, StateError::PersistenceTask(_)), "unexpected error: {err}");
        assert!(rt.block_on(store.adapter().load()).unwrap().is_none());
    }

    #[test]
    fn test_writes_use_runtime_captured_at_construction() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let store = rt.block_on(async { store_over(MemoryStore::new()) });

        // Mutate from plain synchronous code, outside any runtime context.
        let pending = store.upsert_server(test_server("1", "Alpha"));

        let outcome = rt.block_on(pending.wait()).unwrap();
        assert_eq!(outcome, SaveOutcome::Written { version: 1 });

        let persisted = rt.block_on(store.adapter().load()).unwrap().unwrap();
        assert_eq!(names(&persisted.server_list), ["Alpha"]);
    }

    #[tokio::test]
    async fn test_open_sqlite_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            database_path: dir.path().join("nested").join("launcher.db"),
            ..StoreConfig::default()
        };

        {
            let store = ServerStore::open(&config).await.unwrap();
            hydrate(&store).await.unwrap();
            store
                .set_server_list(list_of(&[("1", "Alpha")]))
                .wait()
                .await
                .unwrap();
            store.adapter().backend().close().await;
        }

        let store = ServerStore::open(&config).await.unwrap();
        assert_eq!(
            hydrate(&store).await.unwrap(),
            Hydration::Restored { servers: 1 }
        );
        assert_eq!(names(&store.server_list()), ["Alpha"]);
    }
}
