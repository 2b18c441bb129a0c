//! Partition schema manager
//!
//! Ensures the on-disk partition layout exists before any read or write is
//! attempted. Creation is create-if-absent inside one transaction: a restart
//! never truncates existing data, and a failure leaves no partial layout
//! behind.

use rusqlite::Transaction;
use tracing::debug;

use crate::core_store::db::Store;
use crate::core_store::errors::{StoreError, StoreResult};
use crate::core_store::partition::{
    sorted_partition, TypeRegistry, CONFIG_PARTITION, CONTENT_INDEX_PARTITION, USERS_PARTITION,
};

/// Create every required partition if absent: primary + sorted-index pair per
/// registered content type, plus the three fixed system partitions. Runs as a
/// single atomic transaction and verifies the layout before committing.
pub fn ensure_schema(store: &Store, types: &TypeRegistry) -> StoreResult<()> {
    store.with_write(|tx| {
        for content_type in types.iter() {
            let sorted = sorted_partition(content_type);
            tx.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{content_type}" (
                    id     TEXT PRIMARY KEY,
                    record BLOB NOT NULL
                );
                CREATE TABLE IF NOT EXISTS "{sorted}" (
                    sort_key INTEGER NOT NULL,
                    id       TEXT NOT NULL,
                    PRIMARY KEY (sort_key, id)
                );
                "#
            ))?;
        }

        tx.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{CONFIG_PARTITION}" (
                k TEXT PRIMARY KEY,
                v BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS "{USERS_PARTITION}" (
                email   TEXT PRIMARY KEY,
                account BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS "{CONTENT_INDEX_PARTITION}" (
                k TEXT PRIMARY KEY,
                v BLOB NOT NULL
            );
            "#
        ))?;

        for name in required_partitions(types) {
            if !partition_exists(tx, &name)? {
                return Err(StoreError::SchemaInconsistent(name));
            }
        }

        debug!(types = types.len(), "partition schema ensured");
        Ok(())
    })
}

/// Every partition name the layout requires for the given registry
pub fn required_partitions(types: &TypeRegistry) -> Vec<String> {
    let mut names = Vec::with_capacity(types.len() * 2 + 3);
    for content_type in types.iter() {
        names.push(content_type.to_string());
        names.push(sorted_partition(content_type));
    }
    names.push(CONFIG_PARTITION.to_string());
    names.push(USERS_PARTITION.to_string());
    names.push(CONTENT_INDEX_PARTITION.to_string());
    names
}

fn partition_exists(tx: &Transaction<'_>, name: &str) -> StoreResult<bool> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
