//! Cache invalidation coordinator
//!
//! The cache token is opaque: downstream caches only rely on "changed implies
//! different". A fresh random token is generated per invalidation event and
//! persisted as the settings record's etag; the HTTP layer serves it as a
//! response header.

use metrics::counter;
use tracing::info;
use uuid::Uuid;

use crate::core_settings::SettingsStore;
use crate::core_store::errors::StoreResult;

/// Flag in the settings record's cache options that requests invalidation on
/// every admin settings save
pub const INVALIDATE_FLAG: &str = "invalidate";

/// Opaque token, unique per invalidation event
pub fn new_cache_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate and persist a new cache token, returning it.
///
/// Invoked unconditionally once at startup so caches from a previous run are
/// treated as stale, on settings saves carrying the invalidate flag, and on
/// content mutation when that policy is enabled.
pub fn invalidate_cache(settings: &SettingsStore) -> StoreResult<String> {
    let token = settings.rotate_etag()?;
    counter!("settings.cache.invalidations").increment(1);
    info!(etag = %token, "cache invalidated");
    Ok(token)
}
