//! Lifecycle tests: partition layout and settings across restarts, and the
//! ordered-listing flow end to end.

use std::time::Duration;

use crate::core_index::{sorted_ids, IndexSupervisor};
use crate::core_settings::SettingsStore;
use crate::core_store::content::put_content;
use crate::core_store::db::Store;
use crate::core_store::partition::TypeRegistry;
use crate::core_store::schema::{ensure_schema, required_partitions};

fn record(id: &str, timestamp: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "id": id, "timestamp": timestamp })).unwrap()
}

#[test]
fn test_schema_survives_reopen_without_truncation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("system.db");
    let types = TypeRegistry::from_names(["post"]).unwrap();

    {
        let store = Store::open(&path, 2, Duration::from_secs(5)).unwrap();
        ensure_schema(&store, &types).unwrap();
        put_content(&store, "post", &record("a", 1)).unwrap();
    }

    let store = Store::open(&path, 2, Duration::from_secs(5)).unwrap();
    ensure_schema(&store, &types).unwrap();

    store
        .with_read(|conn| {
            for name in required_partitions(&types) {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [name.as_str()],
                    |row| row.get(0),
                )?;
                assert_eq!(count, 1, "missing partition {name}");
            }
            let rows: i64 =
                conn.query_row(r#"SELECT COUNT(*) FROM "post""#, [], |row| row.get(0))?;
            assert_eq!(rows, 1);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_settings_record_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("system.db");
    let types = TypeRegistry::new();

    let token = {
        let store = Store::open(&path, 2, Duration::from_secs(5)).unwrap();
        ensure_schema(&store, &types).unwrap();
        let settings = SettingsStore::open(store).unwrap();
        settings.rotate_etag().unwrap()
    };

    let store = Store::open(&path, 2, Duration::from_secs(5)).unwrap();
    let settings = SettingsStore::open(store).unwrap();
    assert_eq!(settings.get("etag"), Some(token));
}

#[tokio::test]
async fn test_ordered_listing_scenario() {
    // Fresh store, one content type "post" with 3 records whose order keys
    // arrive as 3, 1, 2; the sorted index must list them as 1, 2, 3.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("system.db"), 2, Duration::from_secs(5)).unwrap();
    let types = TypeRegistry::from_names(["post"]).unwrap();
    ensure_schema(&store, &types).unwrap();

    put_content(&store, "post", &record("first", 3)).unwrap();
    put_content(&store, "post", &record("second", 1)).unwrap();
    put_content(&store, "post", &record("third", 2)).unwrap();

    let supervisor = IndexSupervisor::new(store.clone());
    let entries = supervisor.sort_content("post").await.unwrap();
    assert_eq!(entries, 3);

    assert_eq!(sorted_ids(&store, "post").unwrap(), vec!["second", "third", "first"]);
}
