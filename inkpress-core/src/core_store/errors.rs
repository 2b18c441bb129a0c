//! Error types for the store subsystem

use thiserror::Error;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying store file cannot be opened or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A required partition is missing after an attempted creation
    #[error("Schema inconsistent: partition '{0}' missing after creation")]
    SchemaInconsistent(String),

    /// The persisted settings record cannot be deserialized
    #[error("Cannot decode persisted settings: {0}")]
    ConfigDecode(String),

    /// A sorted-index rebuild failed for one content type
    #[error("Index rebuild failed for '{content_type}': {reason}")]
    IndexRebuild { content_type: String, reason: String },

    /// The readiness probe could not read the users partition
    #[error("Readiness check failed: {0}")]
    Readiness(String),

    /// A partition or content-type name is not acceptable
    #[error("Invalid partition name: {0}")]
    InvalidPartition(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization or deserialization of a record failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A second handle was opened on a store file already owned by this process
    #[error("Store already open: {0}")]
    AlreadyOpen(String),

    /// SQLite-level error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
