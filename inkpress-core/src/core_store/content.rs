//! Content record operations over the primary partitions
//!
//! Records are opaque JSON to the core: only the `id` / `timestamp` envelope
//! is decoded, to key the primary partition and to extract the order key the
//! sorted-index builder needs. Each mutation also maintains the cross-type
//! row in the content-index partition.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core_store::db::Store;
use crate::core_store::errors::{StoreError, StoreResult};
use crate::core_store::partition::{validate_type_name, CONTENT_INDEX_PARTITION};

/// The envelope the core extracts from an otherwise opaque record.
/// `timestamp` is the creation time in epoch milliseconds and doubles as the
/// display order key; missing timestamps sort first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Pointer stored in the content-index partition for cross-type lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    #[serde(rename = "type")]
    pub content_type: String,
    pub id: String,
}

fn index_key(content_type: &str, id: &str) -> String {
    format!("{content_type}:{id}")
}

/// Decode the envelope from a serialized record
pub fn record_meta(record: &[u8]) -> StoreResult<RecordMeta> {
    let meta: RecordMeta = serde_json::from_slice(record)?;
    if meta.id.is_empty() {
        return Err(StoreError::Serialization("record has empty id".to_string()));
    }
    Ok(meta)
}

/// Insert or replace a record in its type's primary partition and refresh the
/// cross-type index row, in one transaction.
pub fn put_content(store: &Store, content_type: &str, record: &[u8]) -> StoreResult<RecordMeta> {
    validate_type_name(content_type)?;
    let meta = record_meta(record)?;

    store.with_write(|tx| {
        tx.execute(
            &format!(r#"INSERT OR REPLACE INTO "{content_type}" (id, record) VALUES (?, ?)"#),
            (&meta.id, record),
        )?;

        let pointer = serde_json::to_vec(&ContentRef {
            content_type: content_type.to_string(),
            id: meta.id.clone(),
        })?;
        tx.execute(
            &format!(
                r#"INSERT OR REPLACE INTO "{CONTENT_INDEX_PARTITION}" (k, v) VALUES (?, ?)"#
            ),
            (index_key(content_type, &meta.id), pointer),
        )?;
        Ok(())
    })?;

    debug!(content_type, id = %meta.id, "content stored");
    Ok(meta)
}

/// Fetch a record by identifier
pub fn get_content(store: &Store, content_type: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
    validate_type_name(content_type)?;
    store.with_read(|conn| {
        let mut stmt =
            conn.prepare(&format!(r#"SELECT record FROM "{content_type}" WHERE id = ?"#))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    })
}

/// Delete a record and its content-index row. `NotFound` if no such record.
pub fn delete_content(store: &Store, content_type: &str, id: &str) -> StoreResult<()> {
    validate_type_name(content_type)?;
    store.with_write(|tx| {
        let deleted = tx.execute(
            &format!(r#"DELETE FROM "{content_type}" WHERE id = ?"#),
            [id],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotFound(index_key(content_type, id)));
        }
        tx.execute(
            &format!(r#"DELETE FROM "{CONTENT_INDEX_PARTITION}" WHERE k = ?"#),
            [index_key(content_type, id)],
        )?;
        Ok(())
    })
}

/// Scan every record of a type, in primary-key order
pub fn all_content(store: &Store, content_type: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
    validate_type_name(content_type)?;
    store.with_read(|conn| {
        let mut stmt =
            conn.prepare(&format!(r#"SELECT id, record FROM "{content_type}" ORDER BY id"#))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Resolve a content-index key back to its type/id pointer
pub fn lookup_content_ref(store: &Store, key: &str) -> StoreResult<Option<ContentRef>> {
    store.with_read(|conn| {
        let mut stmt =
            conn.prepare(&format!(r#"SELECT v FROM "{CONTENT_INDEX_PARTITION}" WHERE k = ?"#))?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => {
                let raw: Vec<u8> = row.get(0)?;
                Ok(Some(serde_json::from_slice(&raw)?))
            }
            None => Ok(None),
        }
    })
}
