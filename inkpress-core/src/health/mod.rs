//! Health surface for the persistence core

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::core_index::IndexSupervisor;
use crate::core_store::db::Store;
use crate::core_store::users::is_bootstrapped;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> u16 {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

/// Component health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub last_check: SystemTime,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            last_check: SystemTime::now(),
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            last_check: SystemTime::now(),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            last_check: SystemTime::now(),
        }
    }
}

/// Aggregate health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub timestamp: SystemTime,
    pub components: Vec<ComponentHealth>,
}

/// Store reachability
pub fn check_store(store: &Store) -> ComponentHealth {
    match store.ping() {
        Ok(()) => ComponentHealth::healthy("store"),
        Err(err) => ComponentHealth::unhealthy("store", err.to_string()),
    }
}

/// Minimum-setup state: degraded (not unhealthy) until the first
/// administrative account exists
pub fn check_bootstrap(store: &Store) -> ComponentHealth {
    match is_bootstrapped(store) {
        Ok(true) => ComponentHealth::healthy("bootstrap"),
        Ok(false) => ComponentHealth::degraded("bootstrap", "no administrative account yet"),
        Err(err) => ComponentHealth::unhealthy("bootstrap", err.to_string()),
    }
}

/// Per-type sorted-index state from the supervisor. A failed rebuild is
/// degraded, not unhealthy: serving continues against the stale index.
pub fn check_indexes(supervisor: &IndexSupervisor) -> Vec<ComponentHealth> {
    supervisor
        .all_status()
        .into_iter()
        .map(|(content_type, status)| {
            let name = format!("index/{content_type}");
            match status.last_error {
                Some(err) => ComponentHealth::degraded(name, err),
                None => ComponentHealth::healthy(name),
            }
        })
        .collect()
}

/// Aggregate report over store, bootstrap state and index status
pub fn check(store: &Store, supervisor: &IndexSupervisor) -> HealthCheck {
    let mut components = vec![check_store(store), check_bootstrap(store)];
    components.extend(check_indexes(supervisor));

    let status = if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthCheck { status, timestamp: SystemTime::now(), components }
}
