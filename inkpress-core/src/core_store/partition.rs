//! Partition naming and the content-type registry
//!
//! A partition is an independently addressable key space inside the store,
//! realized as one SQLite table. Every registered content type owns two
//! partitions: the primary partition (keyed by record identifier) and a
//! sorted-index partition whose name is derived by suffixing the type name.

use std::collections::BTreeSet;

use crate::core_store::errors::{StoreError, StoreResult};

/// Singleton system-settings partition, exactly one row under key `settings`
pub const CONFIG_PARTITION: &str = "__config";

/// Administrative accounts, one row per account
pub const USERS_PARTITION: &str = "__users";

/// Cross-type lookup metadata
pub const CONTENT_INDEX_PARTITION: &str = "__content_index";

/// Suffix deriving a type's sorted-index partition from its primary one
pub const SORTED_SUFFIX: &str = "__sorted";

/// Name of the sorted-index partition for a content type
pub fn sorted_partition(content_type: &str) -> String {
    format!("{content_type}{SORTED_SUFFIX}")
}

/// Validate a content-type name before it is spliced into a quoted SQL
/// identifier. Must start with a letter; letters, digits, `_` and `-` after.
pub fn validate_type_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPartition(name.to_string()))
    }
}

/// The set of content types registered with the store.
///
/// Supplied externally at startup; the core only needs the stable type names.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    names: BTreeSet<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of names, validating each
    pub fn from_names<I, S>(names: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name)?;
        }
        Ok(registry)
    }

    /// Register a content type. Re-registering an existing name is a no-op.
    pub fn register(&mut self, name: impl Into<String>) -> StoreResult<()> {
        let name = name.into();
        validate_type_name(&name)?;
        self.names.insert(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
