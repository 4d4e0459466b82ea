use std::future::Future;

use anyhow::Result as AnyResult;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{
    Account, Cents, IntegrityReport, OwnerId, TransferStage, build_integrity_report, covers,
};
use crate::storage::{AccountStore, StorageError, StoreTransaction};

use super::LedgerError;

/// Application service providing the ledger operations.
///
/// Holds no mutable state of its own: every mutation goes through one bounded
/// transaction on the [`AccountStore`], and concurrent access to the same
/// account is serialized by the storage engine's locks.
pub struct LedgerService {
    store: AccountStore,
    config: LedgerConfig,
}

impl LedgerService {
    /// Create a new ledger service over the given store.
    pub fn new(store: AccountStore, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Create (if needed) and migrate the configured database.
    pub async fn init(config: &LedgerConfig) -> AnyResult<Self> {
        let store = AccountStore::init(config).await?;
        Ok(Self::new(store, config.clone()))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> AnyResult<Self> {
        let store = AccountStore::connect(config, false).await?;
        Ok(Self::new(store, config.clone()))
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================
    // Ledger operations
    // ========================

    /// Open a zero-balance account for `owner_id`.
    pub async fn create_account(&self, owner_id: OwnerId) -> Result<Account, LedgerError> {
        let account = self
            .with_deadline("create_account", async {
                Ok::<_, LedgerError>(self.store.create(owner_id).await?)
            })
            .await?;

        info!(owner_id, "account created");
        Ok(account)
    }

    /// Credit `amount` to an existing account.
    pub async fn deposit(&self, owner_id: OwnerId, amount: Cents) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        self.with_deadline("deposit", async {
            Ok::<_, LedgerError>(self.store.increment_balance(owner_id, amount).await?)
        })
        .await?;

        info!(owner_id, amount, "deposit applied");
        Ok(())
    }

    /// Move `amount` from `from_id` to `to_id`, all or nothing.
    ///
    /// The source row stays locked from the balance check until commit, so two
    /// transfers draining the same account cannot both pass the check on a
    /// stale balance.
    ///
    /// A `Timeout` does not promise a rollback: the deadline may fire while the
    /// commit is in flight and the transfer may still have landed.
    pub async fn transfer(
        &self,
        from_id: OwnerId,
        to_id: OwnerId,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if from_id == to_id {
            return Err(LedgerError::SelfTransfer(from_id));
        }

        let span = info_span!(
            "transfer",
            transfer_id = %Uuid::new_v4(),
            from = from_id,
            to = to_id,
            amount
        );

        self.with_deadline("transfer", self.run_transfer(from_id, to_id, amount))
            .instrument(span)
            .await
    }

    /// Existence check for a would-be counterparty. Not transactional with any
    /// later transfer.
    pub async fn exists(&self, owner_id: OwnerId) -> Result<bool, LedgerError> {
        let found = self
            .with_deadline("exists", async {
                Ok::<_, LedgerError>(self.store.exists(owner_id).await?)
            })
            .await?;
        debug!(owner_id, found, "existence check");
        Ok(found)
    }

    // ========================
    // Reads
    // ========================

    pub async fn account(&self, owner_id: OwnerId) -> Result<Account, LedgerError> {
        self.with_deadline("account", async {
            self.store
                .get_account(owner_id)
                .await?
                .ok_or(LedgerError::AccountNotFound(owner_id))
        })
        .await
    }

    pub async fn balance(&self, owner_id: OwnerId) -> Result<Cents, LedgerError> {
        Ok(self.account(owner_id).await?.balance)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.with_deadline("list_accounts", async {
            Ok::<_, LedgerError>(self.store.list_accounts().await?)
        })
        .await
    }

    /// Verify ledger-wide invariants against the current account set.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let report = self
            .with_deadline("check_integrity", async {
                self.store.ping().await?;
                let (accounts, stored_total) = self.store.snapshot().await?;
                Ok::<_, LedgerError>(build_integrity_report(&accounts, stored_total))
            })
            .await?;

        if !report.is_healthy() {
            warn!(
                negative = ?report.negative_accounts,
                listed = report.total_balance,
                stored = report.stored_total,
                "ledger integrity violated"
            );
        }
        Ok(report)
    }

    // ========================
    // Internals
    // ========================

    /// Bound `op` by the configured deadline. On expiry the future is dropped,
    /// which drops any open transaction and rolls it back.
    async fn with_deadline<T, F>(&self, op: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        let limit = self.config.operation_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, ?limit, "operation deadline exceeded");
                Err(StorageError::Timeout(limit).into())
            }
        }
    }

    async fn run_transfer(
        &self,
        from_id: OwnerId,
        to_id: OwnerId,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut stage = TransferStage::Begin;

        match Self::apply_transfer(&mut tx, &mut stage, from_id, to_id, amount).await {
            Ok(()) => {
                stage.advance();
                if let Err(err) = tx.commit().await {
                    warn!(%stage, error = %err, "commit failed");
                    return Err(err.into());
                }
                info!("transfer committed");
                Ok(())
            }
            Err(err) => {
                debug!(%stage, debited = stage.has_debited(), error = %err, "transfer aborted");
                if let Err(rollback_err) = tx.rollback().await {
                    // The connection discards the transaction when it is dropped.
                    warn!(%stage, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Lock, check, debit, credit. `stage` tracks how far we got so the caller
    /// can report it; committing is left to the caller.
    async fn apply_transfer(
        tx: &mut StoreTransaction,
        stage: &mut TransferStage,
        from_id: OwnerId,
        to_id: OwnerId,
        amount: Cents,
    ) -> Result<(), LedgerError> {
        stage.advance();
        let balance = tx.read_for_update(from_id).await?;

        stage.advance();
        if !covers(balance, amount) {
            return Err(LedgerError::InsufficientBalance {
                owner_id: from_id,
                balance,
                required: amount,
            });
        }

        stage.advance();
        tx.increment_balance(from_id, -amount).await?;

        stage.advance();
        tx.increment_balance(to_id, amount).await?;

        Ok(())
    }
}
