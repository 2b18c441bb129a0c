//! Administrative account storage and the readiness probe

use serde::{Deserialize, Serialize};

use crate::core_store::db::Store;
use crate::core_store::errors::{StoreError, StoreResult};
use crate::core_store::partition::USERS_PARTITION;

/// An administrative account. The password hash is produced by the external
/// authentication collaborator; the core only persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub hash: String,
}

/// Insert or replace an account, keyed by email
pub fn put_user(store: &Store, account: &Account) -> StoreResult<()> {
    let serialized = serde_json::to_vec(account)?;
    store.with_write(|tx| {
        tx.execute(
            &format!(r#"INSERT OR REPLACE INTO "{USERS_PARTITION}" (email, account) VALUES (?, ?)"#),
            (&account.email, serialized),
        )?;
        Ok(())
    })
}

/// Fetch an account by email
pub fn get_user(store: &Store, email: &str) -> StoreResult<Option<Account>> {
    store.with_read(|conn| {
        let mut stmt =
            conn.prepare(&format!(r#"SELECT account FROM "{USERS_PARTITION}" WHERE email = ?"#))?;
        let mut rows = stmt.query([email])?;
        match rows.next()? {
            Some(row) => {
                let raw: Vec<u8> = row.get(0)?;
                Ok(Some(serde_json::from_slice(&raw)?))
            }
            None => Ok(None),
        }
    })
}

/// Number of administrative accounts
pub fn user_count(store: &Store) -> StoreResult<u64> {
    store.with_read(|conn| {
        let count: i64 = conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{USERS_PARTITION}""#),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    })
}

/// True iff at least one administrative account exists, which signals that
/// minimum setup is complete. A storage failure here means the process cannot
/// determine its own readiness and must abort startup, so it is reported as
/// its own error category rather than silently mapped to `false`.
pub fn is_bootstrapped(store: &Store) -> StoreResult<bool> {
    match user_count(store) {
        Ok(count) => Ok(count > 0),
        Err(err) => Err(StoreError::Readiness(err.to_string())),
    }
}
