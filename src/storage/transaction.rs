use sqlx::{Sqlite, Transaction};
use tracing::trace;

use crate::domain::{Cents, OwnerId};

use super::{StoreError, store::apply_delta};

/// A scoped unit of work against the account store.
///
/// `commit` and `rollback` consume the transaction, so nothing can be issued
/// on a finished one. If the value is dropped on any other path (early
/// return, `?`, a cancelled future) the underlying transaction rolls back.
pub struct StoreTransaction {
    tx: Transaction<'static, Sqlite>,
    locked: Vec<OwnerId>,
}

impl StoreTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            tx,
            locked: Vec::new(),
        }
    }

    /// Return the current balance of `owner_id` and hold an exclusive lock on
    /// it until this transaction ends.
    ///
    /// The lock is taken with a self-assigning write so the engine grants the
    /// writer lock before the balance is read; any other transaction trying to
    /// lock or mutate the row waits (up to the busy timeout) until we finish.
    /// This must be the first statement of the transaction: SQLite cannot
    /// upgrade a read snapshot to a write lock once another writer committed.
    pub async fn read_for_update(&mut self, owner_id: OwnerId) -> Result<Cents, StoreError> {
        let balance: Option<Cents> = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance WHERE owner_id = ? RETURNING balance",
        )
        .bind(owner_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let balance = balance.ok_or(StoreError::AccountNotFound(owner_id))?;
        self.locked.push(owner_id);
        trace!(owner_id, balance, "row locked");
        Ok(balance)
    }

    /// `balance += delta` inside this transaction. The caller guarantees a
    /// negative delta cannot take the balance below zero.
    pub async fn increment_balance(&mut self, owner_id: OwnerId, delta: Cents) -> Result<(), StoreError> {
        apply_delta(&mut *self.tx, owner_id, delta).await
    }

    /// Rows locked so far, in acquisition order.
    pub fn locked(&self) -> &[OwnerId] {
        &self.locked
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
