//! SQLite state store implementation.
//!
//! The durable backend used by the launcher: a single database file in the
//! application data directory.
//!
//! Features:
//! - WAL mode for concurrent readers
//! - Per-key versions bumped on every overwrite

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::{Result, StateError};
use crate::store::{validate_key, Entry, StateStore};

/// SQLite implementation of StateStore.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a SQLite store at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite store at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| StateError::ConnectionError(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StateError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StateError::ConnectionError(e.to_string()))?;

        // A second connection would see a different, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StateError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Get current Unix timestamp.
    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    /// Convert Unix timestamp to SystemTime.
    fn unix_to_system_time(unix: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(unix.max(0) as u64)
    }
}

// Primary SQLite result codes (low byte of the extended code).
const SQLITE_IOERR: i32 = 10;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;

/// Classify a SQLite result code as unavailable storage or a full disk.
fn classify_sqlite_code(code: i32) -> Option<fn(String) -> StateError> {
    match code & 0xff {
        SQLITE_FULL => Some(StateError::StorageFull),
        SQLITE_BUSY | SQLITE_LOCKED | SQLITE_IOERR | SQLITE_CANTOPEN => {
            Some(StateError::ConnectionError)
        }
        _ => None,
    }
}

/// Map SQLx failures onto backend-level errors; anything else stays a
/// `DatabaseError`.
fn map_sqlx_error(err: sqlx::Error) -> StateError {
    let classified = match &err {
        sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_) => Some(StateError::ConnectionError as fn(String) -> StateError),
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .and_then(classify_sqlite_code),
        _ => None,
    };

    match classified {
        Some(make) => make(err.to_string()),
        None => StateError::DatabaseError(err),
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;

        let row: Option<(String, Vec<u8>, i64, i64, i64)> = sqlx::query_as(
            "SELECT key, value, version, created_at, updated_at FROM kv_store WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(key, value, version, created_at, updated_at)| Entry {
            key,
            value,
            version: version as u64,
            created_at: Self::unix_to_system_time(created_at),
            updated_at: Self::unix_to_system_time(updated_at),
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        validate_key(key)?;

        let now = Self::now_unix();

        let (version,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO kv_store (key, value, version, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = version + 1,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(key, version, bytes = value.len(), "SQLite value written");
        Ok(version as u64)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Plain prefix comparison; LIKE would treat `_` and `%` as wildcards.
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?)) = ? ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_set_and_get() {
        let store = SqliteStore::in_memory().await.unwrap();

        let version = store
            .set("/server-storage", b"value".to_vec())
            .await
            .unwrap();
        assert_eq!(version, 1);

        let entry = store.get("/server-storage").await.unwrap().unwrap();
        assert_eq!(entry.key, "/server-storage");
        assert_eq!(entry.value, b"value");
        assert_eq!(entry.version, 1);
    }

    #[tokio::test]
    async fn test_sqlite_version_increment() {
        let store = SqliteStore::in_memory().await.unwrap();

        let v1 = store.set("/key", b"v1".to_vec()).await.unwrap();
        let v2 = store.set("/key", b"v2".to_vec()).await.unwrap();

        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(store.get("/key").await.unwrap().unwrap().value, b"v2");
    }

    #[tokio::test]
    async fn test_sqlite_delete() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("/key", b"value".to_vec()).await.unwrap();
        assert!(store.exists("/key").await.unwrap());

        store.delete("/key").await.unwrap();
        assert!(!store.exists("/key").await.unwrap());
        assert_eq!(store.version("/key").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_list() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("/servers/a", b"1".to_vec()).await.unwrap();
        store.set("/servers/b", b"2".to_vec()).await.unwrap();
        store.set("/settings/theme", b"3".to_vec()).await.unwrap();

        let servers = store.list("/servers/").await.unwrap();
        assert_eq!(servers.len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_list_treats_prefix_literally() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("/server_a", b"1".to_vec()).await.unwrap();
        store.set("/serverXa", b"2".to_vec()).await.unwrap();
        store.set("/server%b", b"3".to_vec()).await.unwrap();

        assert_eq!(store.list("/server_").await.unwrap(), vec!["/server_a".to_string()]);
        assert_eq!(store.list("/server%").await.unwrap(), vec!["/server%b".to_string()]);
        assert_eq!(store.list("/server").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.close().await;

        let err = store.set("/key", b"value".to_vec()).await.unwrap_err();
        assert!(matches!(err, StateError::ConnectionError(_)), "unexpected error: {err}");
        assert!(err.is_retryable());

        let err = store.get("/key").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sqlite_codes_are_classified() {
        let full = classify_sqlite_code(SQLITE_FULL).map(|make| make("disk".to_string()));
        assert!(matches!(full, Some(StateError::StorageFull(_))));

        // SQLITE_BUSY_SNAPSHOT is an extended BUSY code
        let busy = classify_sqlite_code(517).map(|make| make("busy".to_string()));
        assert!(matches!(busy, Some(StateError::ConnectionError(_))));

        // SQLITE_CONSTRAINT stays a plain database error
        assert!(classify_sqlite_code(19).is_none());
    }

    #[test]
    fn test_pool_errors_map_to_connection_error() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StateError::ConnectionError(_)));
        assert!(err.is_retryable());

        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StateError::DatabaseError(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_sqlite_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.set("/key", b"persisted".to_vec()).await.unwrap();
            store.close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        let entry = store.get("/key").await.unwrap().unwrap();
        assert_eq!(entry.value, b"persisted");
    }
}
