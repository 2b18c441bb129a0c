//! Store handle over SQLite via an r2d2 connection pool
//!
//! WAL journal mode gives the single-writer / multi-reader model the core
//! relies on: any number of concurrent read transactions, one writer at a
//! time, writers queueing on the busy timeout. Journal mode and foreign-key
//! enforcement are configured at connection init, never inside a transaction
//! (SQLite rejects changing `journal_mode` there).

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction};

use crate::core_store::errors::{StoreError, StoreResult};

/// How long `open` waits for the initial connection before declaring the
/// store unavailable
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Central store handle. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the store file at `path`.
    ///
    /// Failure here is `StorageUnavailable` and is fatal to startup: the
    /// process must not serve without a store.
    pub fn open(path: &Path, pool_size: u32, busy_timeout: Duration) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn| Self::configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECT_TIMEOUT)
            .build(manager)
            .map_err(|e| StoreError::StorageUnavailable(format!("{}: {e}", path.display())))?;

        Ok(Self { pool, path: Some(path.to_path_buf()) })
    }

    /// In-memory store for tests. The pool is pinned to a single connection
    /// so every operation observes the same database.
    #[cfg(test)]
    pub fn memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| Self::configure_connection(conn, Duration::from_secs(5)));

        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(CONNECT_TIMEOUT)
            .build(manager)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;

        Ok(Self { pool, path: None })
    }

    fn configure_connection(
        conn: &mut Connection,
        busy_timeout: Duration,
    ) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Path of the backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(StoreError::from)
    }

    /// Run `f` inside a write transaction: committed when `f` returns `Ok`,
    /// rolled back on any error path. The transaction context is valid only
    /// for the duration of the call.
    pub fn with_write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` against a read-only connection. WAL readers never block the
    /// writer and vice versa.
    pub fn with_read<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn()?;
        f(&conn)
    }

    /// Cheap liveness probe used by the health surface
    pub fn ping(&self) -> StoreResult<()> {
        self.with_read(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}
