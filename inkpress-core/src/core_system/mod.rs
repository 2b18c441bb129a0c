//! Process lifecycle and startup sequencing
//!
//! `System` wires the persistence core together and owns the store handle.
//! The synchronous startup phase runs in a fixed order: open the store,
//! ensure the partition schema, seed and prime the settings record, install
//! the persisted authentication secret, invalidate downstream caches. The
//! per-type sorted-index rebuilds are then launched as independent background
//! tasks. Any failure in the synchronous phase is fatal to startup; failures
//! in the background phase are isolated per type.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::info;

use crate::config::AppConfig;
use crate::core_auth::AuthContext;
use crate::core_index::{self, IndexSupervisor};
use crate::core_settings::{invalidate_cache, SettingsPatch, SettingsStore, SiteSettings};
use crate::core_store::content::{self, RecordMeta};
use crate::core_store::db::Store;
use crate::core_store::errors::{StoreError, StoreResult};
use crate::core_store::partition::TypeRegistry;
use crate::core_store::schema::ensure_schema;
use crate::core_store::users;
use crate::health::{self, HealthCheck};

// One owner per store file within this process. A second `init` on the same
// path must fail loudly instead of racing the first handle.
fn open_stores() -> &'static Mutex<HashSet<PathBuf>> {
    static OPEN: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    OPEN.get_or_init(|| Mutex::new(HashSet::new()))
}

struct OpenGuard {
    path: PathBuf,
}

impl OpenGuard {
    fn acquire(path: PathBuf) -> StoreResult<Self> {
        let mut open = open_stores().lock().unwrap_or_else(PoisonError::into_inner);
        if !open.insert(path.clone()) {
            return Err(StoreError::AlreadyOpen(path.display().to_string()));
        }
        Ok(Self { path })
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        let mut open = open_stores().lock().unwrap_or_else(PoisonError::into_inner);
        open.remove(&self.path);
    }
}

/// Handle to an initialized persistence core
pub struct System {
    store: Store,
    settings: Arc<SettingsStore>,
    auth: Arc<AuthContext>,
    indexes: Arc<IndexSupervisor>,
    types: TypeRegistry,
    invalidate_on_content_change: bool,
    _guard: OpenGuard,
}

impl System {
    /// Run the synchronous startup phase. Every error here is fatal: the
    /// process must not start serving against a store it could not fully
    /// initialize.
    pub fn init(config: &AppConfig) -> StoreResult<Self> {
        let types = TypeRegistry::from_names(config.content_types.iter().cloned())?;

        std::fs::create_dir_all(&config.store.data_dir)
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?;
        let db_path = config
            .store
            .data_dir
            .canonicalize()
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))?
            .join(&config.store.db_file);

        let guard = OpenGuard::acquire(db_path.clone())?;
        let store = Store::open(&db_path, config.store.pool_size, config.store.busy_timeout)?;

        ensure_schema(&store, &types)?;

        let settings = Arc::new(SettingsStore::open(store.clone())?);

        let auth = Arc::new(AuthContext::new());
        auth.install(&settings.snapshot().client_secret);

        // Caches from a previous run are stale by definition.
        invalidate_cache(&settings)?;

        let indexes = Arc::new(IndexSupervisor::new(store.clone()));

        info!(path = %db_path.display(), types = types.len(), "persistence core initialized");
        Ok(Self {
            store,
            settings,
            auth,
            indexes,
            types,
            invalidate_on_content_change: config.cache.invalidate_on_content_change,
            _guard: guard,
        })
    }

    /// Normal entrypoint: run the synchronous phase, then launch the
    /// per-type index rebuilds in the background. Readiness does not wait
    /// for them.
    pub async fn start(config: &AppConfig) -> StoreResult<Self> {
        let system = Self::init(config)?;
        system.spawn_index_rebuilds();
        Ok(system)
    }

    /// Launch one background rebuild task per registered content type.
    /// Must be called from within the async runtime.
    pub fn spawn_index_rebuilds(&self) {
        self.indexes.spawn_all(self.types.iter());
    }

    /// Cached settings field access
    pub fn get_setting(&self, name: &str) -> Option<String> {
        self.settings.get(name)
    }

    /// Persist a full or partial settings replacement. A changed secret is
    /// re-installed into the authentication context immediately.
    pub fn replace_config(&self, patch: SettingsPatch) -> StoreResult<Arc<SiteSettings>> {
        let snapshot = self.settings.replace(patch)?;
        self.auth.install(&snapshot.client_secret);
        Ok(snapshot)
    }

    /// Rotate and persist the cache token
    pub fn invalidate_cache(&self) -> StoreResult<String> {
        invalidate_cache(&self.settings)
    }

    /// Store a content record, schedule its type's index rebuild, and apply
    /// the content-driven cache-busting policy. Must be called from within
    /// the async runtime.
    pub fn put_content(&self, content_type: &str, record: &[u8]) -> StoreResult<RecordMeta> {
        self.require_registered(content_type)?;
        let meta = content::put_content(&self.store, content_type, record)?;
        self.indexes.spawn_rebuild(content_type);
        if self.invalidate_on_content_change {
            self.invalidate_cache()?;
        }
        Ok(meta)
    }

    /// Fetch a content record
    pub fn get_content(&self, content_type: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.require_registered(content_type)?;
        content::get_content(&self.store, content_type, id)
    }

    /// Delete a content record; same rebuild and cache policy as `put_content`
    pub fn delete_content(&self, content_type: &str, id: &str) -> StoreResult<()> {
        self.require_registered(content_type)?;
        content::delete_content(&self.store, content_type, id)?;
        self.indexes.spawn_rebuild(content_type);
        if self.invalidate_on_content_change {
            self.invalidate_cache()?;
        }
        Ok(())
    }

    /// Identifiers of a type's records in display order
    pub fn sorted_ids(&self, content_type: &str) -> StoreResult<Vec<String>> {
        self.require_registered(content_type)?;
        core_index::sorted_ids(&self.store, content_type)
    }

    /// True iff at least one administrative account exists
    pub fn is_bootstrapped(&self) -> StoreResult<bool> {
        users::is_bootstrapped(&self.store)
    }

    /// Aggregate health report
    pub fn health(&self) -> HealthCheck {
        health::check(&self.store, &self.indexes)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    pub fn indexes(&self) -> &Arc<IndexSupervisor> {
        &self.indexes
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Release the store handle. Consuming `self` makes a double close
    /// unrepresentable; a second `init` on the same path becomes legal once
    /// this returns.
    pub fn close(self) {
        info!("persistence core closed");
    }

    fn require_registered(&self, content_type: &str) -> StoreResult<()> {
        if self.types.contains(content_type) {
            Ok(())
        } else {
            Err(StoreError::InvalidPartition(format!("unregistered type: {content_type}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core_settings::SETTINGS_KEY;
    use crate::core_store::users::{put_user, Account};
    use secrecy::ExposeSecret;

    fn test_config(dir: &std::path::Path, types: &[&str]) -> AppConfig {
        let mut config = AppConfig::default();
        config.store.data_dir = dir.to_path_buf();
        config.content_types = types.iter().map(|t| t.to_string()).collect();
        config
    }

    fn record(id: &str, timestamp: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "id": id, "timestamp": timestamp })).unwrap()
    }

    #[test]
    fn test_init_seeds_settings_and_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let system = System::init(&test_config(dir.path(), &["post"])).unwrap();

        // Zero-valued record seeded, one row under the settings key
        assert_eq!(system.get_setting("client_secret"), Some(String::new()));
        let keys: Vec<String> = system
            .store()
            .with_read(|conn| {
                let mut stmt = conn.prepare(r#"SELECT k FROM "__config""#)?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .unwrap();
        assert_eq!(keys, vec![SETTINGS_KEY.to_string()]);

        // Startup invalidation already rotated the token
        assert_ne!(system.get_setting("etag"), Some(String::new()));
    }

    #[test]
    fn test_double_init_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &[]);

        let first = System::init(&config).unwrap();
        let second = System::init(&config);
        assert!(matches!(second, Err(StoreError::AlreadyOpen(_))));

        first.close();
        let third = System::init(&config);
        assert!(third.is_ok());
    }

    #[test]
    fn test_restart_preserves_data_and_installs_secret() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &["post"]);

        {
            let system = System::init(&config).unwrap();
            assert!(!system.auth().is_installed());
            system
                .replace_config(SettingsPatch {
                    client_secret: Some("s3cret".to_string()),
                    ..Default::default()
                })
                .unwrap();
            system.close();
        }

        let system = System::init(&config).unwrap();
        assert_eq!(system.auth().current().unwrap().expose_secret(), "s3cret");
        assert_eq!(system.get_setting("client_secret"), Some("s3cret".to_string()));
    }

    #[test]
    fn test_replace_config_reinstalls_secret() {
        let dir = tempfile::tempdir().unwrap();
        let system = System::init(&test_config(dir.path(), &[])).unwrap();

        system
            .replace_config(SettingsPatch {
                client_secret: Some("first".to_string()),
                ..Default::default()
            })
            .unwrap();
        system
            .replace_config(SettingsPatch {
                client_secret: Some("second".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(system.auth().current().unwrap().expose_secret(), "second");
    }

    #[test]
    fn test_readiness_flips_on_first_account() {
        let dir = tempfile::tempdir().unwrap();
        let system = System::init(&test_config(dir.path(), &[])).unwrap();

        assert!(!system.is_bootstrapped().unwrap());
        put_user(
            system.store(),
            &Account { email: "admin@example.com".to_string(), hash: "h".to_string() },
        )
        .unwrap();
        assert!(system.is_bootstrapped().unwrap());
    }

    #[tokio::test]
    async fn test_content_flow_reaches_sorted_index() {
        let dir = tempfile::tempdir().unwrap();
        let system = System::start(&test_config(dir.path(), &["post"])).await.unwrap();

        system.put_content("post", &record("a", 3)).unwrap();
        system.put_content("post", &record("b", 1)).unwrap();
        system.put_content("post", &record("c", 2)).unwrap();

        // Consistency is eventual; force a rebuild to observe it now.
        system.indexes().sort_content("post").await.unwrap();
        assert_eq!(system.sorted_ids("post").unwrap(), vec!["b", "c", "a"]);

        system.delete_content("post", "c").unwrap();
        system.indexes().sort_content("post").await.unwrap();
        assert_eq!(system.sorted_ids("post").unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_content_change_invalidation_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), &["post"]);
        config.cache.invalidate_on_content_change = true;

        let system = System::start(&config).await.unwrap();
        let before = system.get_setting("etag").unwrap();
        system.put_content("post", &record("a", 1)).unwrap();
        let after = system.get_setting("etag").unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_unregistered_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let system = System::init(&test_config(dir.path(), &["post"])).unwrap();

        let result = system.get_content("page", "x");
        assert!(matches!(result, Err(StoreError::InvalidPartition(_))));
    }
}
