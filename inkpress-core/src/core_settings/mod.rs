//! Configuration record store
//!
//! Holds the singleton system-settings document persisted under
//! `__config/settings`, plus its cached decoded form. The persisted record is
//! the single authoritative copy; the in-process cache is an immutable `Arc`
//! snapshot swapped as a whole, so readers never observe a partially updated
//! record and the warm read path never touches the store.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core_store::db::Store;
use crate::core_store::errors::{StoreError, StoreResult};
use crate::core_store::partition::CONFIG_PARTITION;

pub mod cache;

pub use cache::{invalidate_cache, new_cache_token, INVALIDATE_FLAG};

/// Key of the one row in the configuration partition
pub const SETTINGS_KEY: &str = "settings";

/// The singleton system-settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub http_port: String,
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub cache: Vec<String>,
}

/// A full or partial replacement submitted by the admin-editing collaborator.
/// `None` fields leave the persisted value untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub http_port: Option<String>,
    pub admin_email: Option<String>,
    pub client_secret: Option<String>,
    pub etag: Option<String>,
    pub cache: Option<Vec<String>>,
}

impl SettingsPatch {
    /// Patch replacing every field with the given record
    pub fn full(settings: SiteSettings) -> Self {
        Self {
            name: Some(settings.name),
            domain: Some(settings.domain),
            http_port: Some(settings.http_port),
            admin_email: Some(settings.admin_email),
            client_secret: Some(settings.client_secret),
            etag: Some(settings.etag),
            cache: Some(settings.cache),
        }
    }

    fn apply(&self, settings: &mut SiteSettings) {
        if let Some(v) = &self.name {
            settings.name = v.clone();
        }
        if let Some(v) = &self.domain {
            settings.domain = v.clone();
        }
        if let Some(v) = &self.http_port {
            settings.http_port = v.clone();
        }
        if let Some(v) = &self.admin_email {
            settings.admin_email = v.clone();
        }
        if let Some(v) = &self.client_secret {
            settings.client_secret = v.clone();
        }
        if let Some(v) = &self.etag {
            settings.etag = v.clone();
        }
        if let Some(v) = &self.cache {
            settings.cache = v.clone();
        }
    }

    /// True when this patch is an admin settings save, as opposed to the
    /// internal etag rotation path
    fn is_settings_save(&self) -> bool {
        self.name.is_some()
            || self.domain.is_some()
            || self.http_port.is_some()
            || self.admin_email.is_some()
            || self.client_secret.is_some()
            || self.cache.is_some()
    }
}

/// Store-backed settings with a cached decoded snapshot
pub struct SettingsStore {
    store: Store,
    cached: RwLock<Arc<SiteSettings>>,
}

impl SettingsStore {
    /// Open the settings store, seeding a zero-valued record if the
    /// configuration partition is empty, and prime the snapshot cache by
    /// decoding the persisted record once. An undecodable persisted record is
    /// fatal (`ConfigDecode`): a corrupt singleton has no safe recovery path.
    pub fn open(store: Store) -> StoreResult<Self> {
        let settings = store.with_write(|tx| {
            match read_settings(tx)? {
                Some(settings) => Ok(settings),
                None => {
                    let seeded = SiteSettings::default();
                    write_settings(tx, &seeded)?;
                    info!("seeded default settings record");
                    Ok(seeded)
                }
            }
        })?;

        Ok(Self { store, cached: RwLock::new(Arc::new(settings)) })
    }

    /// Current decoded record. Warm path: no store access.
    pub fn snapshot(&self) -> Arc<SiteSettings> {
        self.read_cache().clone()
    }

    /// Cached field access by name. `cache` flags are returned joined by `,`.
    pub fn get(&self, name: &str) -> Option<String> {
        let snapshot = self.read_cache();
        match name {
            "name" => Some(snapshot.name.clone()),
            "domain" => Some(snapshot.domain.clone()),
            "http_port" => Some(snapshot.http_port.clone()),
            "admin_email" => Some(snapshot.admin_email.clone()),
            "client_secret" => Some(snapshot.client_secret.clone()),
            "etag" => Some(snapshot.etag.clone()),
            "cache" => Some(snapshot.cache.join(",")),
            _ => None,
        }
    }

    /// Persist a full or partial replacement.
    ///
    /// Read-modify-write inside one transaction, so concurrent saves touching
    /// disjoint fields never drop each other's changes. When the save carries
    /// the `invalidate` cache flag, a fresh cache token is written in the same
    /// transaction. The snapshot cache is swapped before returning, under a
    /// lock held across the store write so in-process saves serialize and the
    /// cache always equals the persisted record.
    pub fn replace(&self, patch: SettingsPatch) -> StoreResult<Arc<SiteSettings>> {
        let mut guard = self.write_cache();

        let merged = self.store.with_write(|tx| {
            let mut next = read_settings(tx)?.unwrap_or_default();
            patch.apply(&mut next);
            if patch.is_settings_save() && next.cache.iter().any(|f| f == INVALIDATE_FLAG) {
                next.etag = new_cache_token();
                debug!(etag = %next.etag, "cache invalidated on settings save");
            }
            write_settings(tx, &next)?;
            Ok(next)
        })?;

        let snapshot = Arc::new(merged);
        *guard = snapshot.clone();
        Ok(snapshot)
    }

    /// Persist a fresh opaque cache token via the transactional update path
    /// and return it
    pub fn rotate_etag(&self) -> StoreResult<String> {
        let token = new_cache_token();
        self.replace(SettingsPatch { etag: Some(token.clone()), ..Default::default() })?;
        Ok(token)
    }

    // Lock poisoning cannot corrupt the snapshot (it is swapped as a whole
    // Arc), so a poisoned cache lock is recovered rather than propagated.
    fn read_cache(&self) -> RwLockReadGuard<'_, Arc<SiteSettings>> {
        match self.cached.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Arc<SiteSettings>> {
        match self.cached.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn read_settings(tx: &Transaction<'_>) -> StoreResult<Option<SiteSettings>> {
    let mut stmt =
        tx.prepare(&format!(r#"SELECT v FROM "{CONFIG_PARTITION}" WHERE k = ?"#))?;
    let mut rows = stmt.query([SETTINGS_KEY])?;
    match rows.next()? {
        Some(row) => {
            let raw: Vec<u8> = row.get(0)?;
            let settings = serde_json::from_slice(&raw)
                .map_err(|e| StoreError::ConfigDecode(e.to_string()))?;
            Ok(Some(settings))
        }
        None => Ok(None),
    }
}

fn write_settings(tx: &Transaction<'_>, settings: &SiteSettings) -> StoreResult<()> {
    let serialized = serde_json::to_vec(settings)?;
    tx.execute(
        &format!(r#"INSERT OR REPLACE INTO "{CONFIG_PARTITION}" (k, v) VALUES (?, ?)"#),
        (SETTINGS_KEY, serialized),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::partition::TypeRegistry;
    use crate::core_store::schema::ensure_schema;

    fn open_settings() -> (Store, SettingsStore) {
        let store = Store::memory().unwrap();
        ensure_schema(&store, &TypeRegistry::new()).unwrap();
        let settings = SettingsStore::open(store.clone()).unwrap();
        (store, settings)
    }

    fn config_rows(store: &Store) -> Vec<String> {
        store
            .with_read(|conn| {
                let mut stmt = conn.prepare(r#"SELECT k FROM "__config""#)?;
                let keys = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .unwrap()
    }

    #[test]
    fn test_open_seeds_zero_valued_record() {
        let (store, settings) = open_settings();

        assert_eq!(settings.get("client_secret"), Some(String::new()));
        assert_eq!(config_rows(&store), vec![SETTINGS_KEY.to_string()]);
    }

    #[test]
    fn test_open_preserves_existing_record() {
        let store = Store::memory().unwrap();
        ensure_schema(&store, &TypeRegistry::new()).unwrap();

        {
            let settings = SettingsStore::open(store.clone()).unwrap();
            settings
                .replace(SettingsPatch {
                    name: Some("My Site".to_string()),
                    ..Default::default()
                })
                .unwrap();
        }

        let reopened = SettingsStore::open(store).unwrap();
        assert_eq!(reopened.get("name"), Some("My Site".to_string()));
    }

    #[test]
    fn test_read_after_write() {
        let (_store, settings) = open_settings();

        settings
            .replace(SettingsPatch {
                name: Some("My Site".to_string()),
                domain: Some("example.com".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(settings.get("name"), Some("My Site".to_string()));
        assert_eq!(settings.get("domain"), Some("example.com".to_string()));
    }

    #[test]
    fn test_partial_patch_preserves_other_fields() {
        let (_store, settings) = open_settings();

        settings
            .replace(SettingsPatch { name: Some("My Site".to_string()), ..Default::default() })
            .unwrap();
        settings
            .replace(SettingsPatch {
                admin_email: Some("admin@example.com".to_string()),
                ..Default::default()
            })
            .unwrap();

        let snapshot = settings.snapshot();
        assert_eq!(snapshot.name, "My Site");
        assert_eq!(snapshot.admin_email, "admin@example.com");
    }

    #[test]
    fn test_save_with_invalidate_flag_rotates_etag() {
        let (_store, settings) = open_settings();

        let before = settings
            .replace(SettingsPatch {
                cache: Some(vec![INVALIDATE_FLAG.to_string()]),
                ..Default::default()
            })
            .unwrap()
            .etag
            .clone();
        assert!(!before.is_empty());

        let after = settings
            .replace(SettingsPatch { name: Some("renamed".to_string()), ..Default::default() })
            .unwrap()
            .etag
            .clone();
        assert_ne!(before, after);
    }

    #[test]
    fn test_save_without_invalidate_flag_keeps_etag() {
        let (_store, settings) = open_settings();
        let token = settings.rotate_etag().unwrap();

        let snapshot = settings
            .replace(SettingsPatch { name: Some("renamed".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(snapshot.etag, token);
    }

    #[test]
    fn test_full_replacement() {
        let (_store, settings) = open_settings();

        let record = SiteSettings {
            name: "My Site".to_string(),
            domain: "example.com".to_string(),
            http_port: "8080".to_string(),
            admin_email: "admin@example.com".to_string(),
            client_secret: "s3cret".to_string(),
            etag: String::new(),
            cache: vec![],
        };
        settings.replace(SettingsPatch::full(record.clone())).unwrap();

        assert_eq!(*settings.snapshot(), record);
    }

    #[test]
    fn test_unknown_field_name() {
        let (_store, settings) = open_settings();
        assert_eq!(settings.get("no_such_field"), None);
    }

    #[test]
    fn test_corrupt_record_is_config_decode() {
        let store = Store::memory().unwrap();
        ensure_schema(&store, &TypeRegistry::new()).unwrap();
        store
            .with_write(|tx| {
                tx.execute(
                    r#"INSERT INTO "__config" (k, v) VALUES (?, ?)"#,
                    (SETTINGS_KEY, b"{corrupt".as_slice()),
                )?;
                Ok(())
            })
            .unwrap();

        let result = SettingsStore::open(store);
        assert!(matches!(result, Err(StoreError::ConfigDecode(_))));
    }
}
