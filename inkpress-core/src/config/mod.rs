//! Process configuration for the persistence core
//!
//! Environment- and file-based configuration with defaults and validation.
//! This is the process-level config (where the store lives, how it logs,
//! which content types are registered); it is distinct from the persisted
//! settings record the admin edits at runtime.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cache-busting policy
    #[serde(default)]
    pub cache: CacheConfig,

    /// Registered content types
    #[serde(default)]
    pub content_types: Vec<String>,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the store file
    pub data_dir: PathBuf,

    /// Store file name within the data directory
    pub db_file: String,

    /// Connection pool size
    pub pool_size: u32,

    /// How long a writer waits for the store's writer slot
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

/// Cache-busting policy. Invalidation on startup and on flagged settings
/// saves always happens; whether plain content mutations also rotate the
/// cache token is a deployment choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub invalidate_on_content_change: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            db_file: "system.db".to_string(),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_target: true }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { invalidate_on_content_change: false }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables follow the pattern `INKPRESS_<SECTION>_<KEY>`, e.g.
    /// `INKPRESS_STORE_DATA_DIR=/var/lib/inkpress`. Content types are a
    /// comma-separated list in `INKPRESS_CONTENT_TYPES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("INKPRESS_STORE_DATA_DIR") {
            config.store.data_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("INKPRESS_STORE_DB_FILE") {
            config.store.db_file = file;
        }
        if let Ok(size) = env::var("INKPRESS_STORE_POOL_SIZE") {
            config.store.pool_size = size
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid pool size: {e}")))?;
        }

        if let Ok(level) = env::var("INKPRESS_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("INKPRESS_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {e}")))?;
        }

        if let Ok(flag) = env::var("INKPRESS_CACHE_INVALIDATE_ON_CONTENT_CHANGE") {
            config.cache.invalidate_on_content_change = flag.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid cache policy flag: {e}"))
            })?;
        }

        if let Ok(types) = env::var("INKPRESS_CONTENT_TYPES") {
            config.content_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.store.db_file.is_empty() {
            return Err(ConfigError::ValidationFailed("db_file must not be empty".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        for content_type in &self.content_types {
            crate::core_store::partition::validate_type_name(content_type).map_err(|_| {
                ConfigError::ValidationFailed(format!("Invalid content type name: {content_type}"))
            })?;
        }

        Ok(())
    }

    /// Full path of the store file
    pub fn db_path(&self) -> PathBuf {
        self.store.data_dir.join(&self.store.db_file)
    }
}
