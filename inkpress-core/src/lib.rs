//! Inkpress persistence core
//!
//! Embedded, transactional storage for a content-serving platform:
//! partitions per content type, sorted secondary indices, the singleton
//! settings record, cache invalidation, authentication-secret bootstrap and
//! the readiness probe. The HTTP, admin-UI and token layers are external
//! collaborators; this crate is the source of truth they build on.

pub mod config;
pub mod core_auth;
pub mod core_index;
pub mod core_settings;
pub mod core_store;
pub mod core_system;
pub mod health;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use core_auth::AuthContext;
pub use core_index::{sorted_ids, IndexStatus, IndexSupervisor};
pub use core_settings::{
    invalidate_cache, SettingsPatch, SettingsStore, SiteSettings, INVALIDATE_FLAG,
};
pub use core_store::{Account, ContentRef, RecordMeta, Store, StoreError, StoreResult, TypeRegistry};
pub use core_system::System;
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
