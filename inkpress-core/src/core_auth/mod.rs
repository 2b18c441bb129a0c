//! Process-wide authentication-secret state
//!
//! The shared secret used by the external token-signing collaborator. Modeled
//! as an explicit context object injected where needed, not a bare global.
//! Updates swap the whole value under a lock; readers always observe either
//! the previous or the new secret, never a torn value.

use std::sync::{PoisonError, RwLock};

use secrecy::SecretString;
use tracing::debug;

/// Holder of the shared authentication secret
#[derive(Default)]
pub struct AuthContext {
    secret: RwLock<Option<SecretString>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the secret. A single swap; an empty value leaves any
    /// previously installed secret untouched, so a configured secret is
    /// never overwritten with emptiness.
    pub fn install(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        let mut guard = self.secret.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(SecretString::new(secret.to_string()));
        debug!("authentication secret installed");
    }

    /// Current secret, if one has been installed
    pub fn current(&self) -> Option<SecretString> {
        self.secret.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_installed(&self) -> bool {
        self.secret.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext").field("installed", &self.is_installed()).finish()
    }
}
