use thiserror::Error;

use crate::domain::{Cents, OwnerId};
use crate::storage::{StorageError, StoreError};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account already exists for owner {0}")]
    DuplicateAccount(OwnerId),

    #[error("Account not found for owner {0}")]
    AccountNotFound(OwnerId),

    #[error("Insufficient balance in account {owner_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        owner_id: OwnerId,
        balance: Cents,
        required: Cents,
    },

    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Cents),

    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(OwnerId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Whether resubmitting the same request may succeed. Only lock conflicts
    /// qualify; everything else needs different inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_retryable())
    }

    /// Conditions the caller can correct, as opposed to server-side failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateAccount(owner) => LedgerError::DuplicateAccount(owner),
            StoreError::AccountNotFound(owner) => LedgerError::AccountNotFound(owner),
            StoreError::Storage(e) => LedgerError::Storage(e),
        }
    }
}
