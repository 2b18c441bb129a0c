//! Sorted index builder
//!
//! Rebuilds each content type's sorted-index partition from its primary
//! partition so forward scans yield records in display order without sorting
//! on read. Rebuilds are launched as fire-and-forget tasks tracked by a
//! supervisor: per-type mutual exclusion, per-type last-success/last-error
//! status, failures isolated per type.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::{Instant, SystemTime};

use metrics::{counter, histogram};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::core_store::content::record_meta;
use crate::core_store::db::Store;
use crate::core_store::errors::{StoreError, StoreResult};
use crate::core_store::partition::{sorted_partition, validate_type_name};

/// Last observed rebuild outcome for one content type
#[derive(Debug, Clone, Default)]
pub struct IndexStatus {
    pub entries: u64,
    pub last_success: Option<SystemTime>,
    pub last_error: Option<String>,
}

/// Supervises per-type rebuild tasks.
///
/// Rebuilds for distinct types run concurrently (they touch disjoint
/// partitions, contending only for the store's writer slot); rebuilds for the
/// same type serialize on a per-type mutex, so a re-trigger during an
/// in-flight rebuild queues instead of cancelling or duplicating it.
pub struct IndexSupervisor {
    store: Store,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    status: RwLock<HashMap<String, IndexStatus>>,
}

impl IndexSupervisor {
    pub fn new(store: Store) -> Self {
        Self { store, locks: StdMutex::new(HashMap::new()), status: RwLock::new(HashMap::new()) }
    }

    /// Rebuild the sorted index for one content type and record the outcome.
    /// Errors are reported to the caller but never affect other types.
    pub async fn sort_content(&self, content_type: &str) -> StoreResult<u64> {
        let lock = self.lock_for(content_type);
        let _guard = lock.lock().await;

        let started = Instant::now();
        let result = rebuild(&self.store, content_type);
        histogram!("index.rebuild.duration_ms").record(started.elapsed().as_millis() as f64);

        let mut status_map = self.status.write().unwrap_or_else(PoisonError::into_inner);
        let status = status_map.entry(content_type.to_string()).or_default();
        match &result {
            Ok(entries) => {
                status.entries = *entries;
                status.last_success = Some(SystemTime::now());
                status.last_error = None;
                counter!("index.rebuild.success").increment(1);
                info!(content_type, entries, "sorted index rebuilt");
            }
            Err(err) => {
                status.last_error = Some(err.to_string());
                counter!("index.rebuild.failed").increment(1);
                error!(content_type, %err, "sorted index rebuild failed, serving stale index");
            }
        }
        result
    }

    /// Launch a rebuild as an independent background task. The task's outcome
    /// lands in the status map; it is never fatal to the process.
    pub fn spawn_rebuild(self: &Arc<Self>, content_type: impl Into<String>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        let content_type = content_type.into();
        tokio::spawn(async move {
            let _ = supervisor.sort_content(&content_type).await;
        })
    }

    /// Launch one rebuild task per content type
    pub fn spawn_all<I, S>(self: &Arc<Self>, types: I) -> Vec<JoinHandle<()>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        types.into_iter().map(|t| self.spawn_rebuild(t)).collect()
    }

    /// Status of one type, if it has been rebuilt (or attempted) at all
    pub fn status(&self, content_type: &str) -> Option<IndexStatus> {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(content_type)
            .cloned()
    }

    /// Snapshot of every type's status
    pub fn all_status(&self) -> HashMap<String, IndexStatus> {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn lock_for(&self, content_type: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(content_type.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// Transactionally clear and repopulate one type's sorted-index partition.
///
/// The whole rebuild happens inside a single write transaction: a reader can
/// never observe a half-rebuilt index, and on any error the rollback leaves
/// the previous (stale but complete) index in place.
fn rebuild(store: &Store, content_type: &str) -> StoreResult<u64> {
    validate_type_name(content_type)
        .and_then(|_| {
            store.with_write(|tx| {
                let sorted = sorted_partition(content_type);
                tx.execute(&format!(r#"DELETE FROM "{sorted}""#), [])?;

                let mut scan =
                    tx.prepare(&format!(r#"SELECT id, record FROM "{content_type}""#))?;
                let mut insert = tx.prepare(&format!(
                    r#"INSERT INTO "{sorted}" (sort_key, id) VALUES (?, ?)"#
                ))?;

                let mut entries = 0u64;
                let mut rows = scan.query([])?;
                while let Some(row) = rows.next()? {
                    let id: String = row.get(0)?;
                    let record: Vec<u8> = row.get(1)?;
                    let meta = record_meta(&record)?;
                    insert.execute((meta.timestamp, &id))?;
                    entries += 1;
                }
                Ok(entries)
            })
        })
        .map_err(|err| StoreError::IndexRebuild {
            content_type: content_type.to_string(),
            reason: err.to_string(),
        })
}

/// Forward scan of a type's sorted index: identifiers in display order
/// (order key ascending, identifier as tie-break)
pub fn sorted_ids(store: &Store, content_type: &str) -> StoreResult<Vec<String>> {
    validate_type_name(content_type)?;
    let sorted = sorted_partition(content_type);
    store.with_read(|conn| {
        let mut stmt = conn
            .prepare(&format!(r#"SELECT id FROM "{sorted}" ORDER BY sort_key ASC, id ASC"#))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}
