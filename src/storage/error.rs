use std::time::Duration;

use thiserror::Error;

use crate::domain::OwnerId;

/// Opaque backend failure. Carries no account semantics; callers see it as a
/// server-side problem with no state change implied.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The engine refused a lock (busy/locked). Safe to resubmit.
    #[error("storage lock conflict: {0}")]
    Conflict(#[source] sqlx::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt account record: {0}")]
    Corrupt(String),

    #[error("storage backend failure: {0}")]
    Backend(#[source] sqlx::Error),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

/// Errors raised by [`AccountStore`](super::AccountStore) primitives.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("account already exists for owner {0}")]
    DuplicateAccount(OwnerId),

    #[error("no account for owner {0}")]
    AccountNotFound(OwnerId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// SQLite primary result codes; extended codes carry these in the low byte.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_CONSTRAINT_PRIMARYKEY: i64 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i64 = 2067;

fn sqlite_code(err: &sqlx::Error) -> Option<i64> {
    err.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse().ok())
}

/// True when `err` is a uniqueness violation on insert.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return true;
        }
    }
    matches!(
        sqlite_code(err),
        Some(SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE)
    )
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return StorageError::Conflict(err);
        }
        match sqlite_code(&err).map(|code| code & 0xff) {
            Some(SQLITE_BUSY | SQLITE_LOCKED) => StorageError::Conflict(err),
            _ => StorageError::Backend(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Storage(err.into())
    }
}
