use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::config::LedgerConfig;
use crate::domain::{Account, Cents, OwnerId};

use super::error::is_unique_violation;
use super::{MIGRATION_001_ACCOUNTS, StorageError, StoreError, StoreTransaction};

/// Durable holder of account rows.
///
/// Cheap to clone: clones share the same connection pool.
#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

impl AccountStore {
    /// Create a new store over an existing SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool on the configured database file.
    pub async fn connect(config: &LedgerConfig, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url())
            .context("Invalid database path")?
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(config.idle_timeout)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", config.database))?;

        debug!(database = %config.database, "connected to account store");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_ACCOUNTS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let store = Self::connect(config, true).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Round-trip to the database to confirm it is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Single-statement primitives
    // ========================

    /// Insert a zero-balance account for `owner_id`.
    pub async fn create(&self, owner_id: OwnerId) -> Result<Account, StoreError> {
        let account = Account::open(owner_id);
        sqlx::query("INSERT INTO accounts (owner_id, balance, created_at) VALUES (?, ?, ?)")
            .bind(account.owner_id)
            .bind(account.balance)
            .bind(account.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateAccount(owner_id)
                } else {
                    e.into()
                }
            })?;
        Ok(account)
    }

    /// Apply `balance += delta` as one atomic statement outside any transaction.
    pub async fn increment_balance(&self, owner_id: OwnerId, delta: Cents) -> Result<(), StoreError> {
        apply_delta(&self.pool, owner_id, delta).await
    }

    /// Lock-free existence check.
    pub async fn exists(&self, owner_id: OwnerId) -> Result<bool, StoreError> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE owner_id = ?)")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found)
    }

    pub async fn get_account(&self, owner_id: OwnerId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT owner_id, balance, created_at FROM accounts WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        fetch_accounts(&self.pool).await
    }

    /// Sum of every balance, computed by the engine.
    pub async fn total_balance(&self) -> Result<Cents, StoreError> {
        fetch_total(&self.pool).await
    }

    /// Every account plus the engine-side total, read from one snapshot so a
    /// concurrent transfer cannot land between the two reads.
    pub async fn snapshot(&self) -> Result<(Vec<Account>, Cents), StoreError> {
        let mut tx = self.pool.begin().await?;
        let accounts = fetch_accounts(&mut *tx).await?;
        let total = fetch_total(&mut *tx).await?;
        tx.commit().await?;
        Ok((accounts, total))
    }

    // ========================
    // Transactions
    // ========================

    /// Start a unit of work. Dropping the returned transaction without calling
    /// [`StoreTransaction::commit`] rolls it back.
    pub async fn begin(&self) -> Result<StoreTransaction, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(StoreTransaction::new(tx))
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account, StorageError> {
        let owner_id: OwnerId = row
            .try_get("owner_id")
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let balance: Cents = row
            .try_get("balance")
            .map_err(|e| StorageError::Corrupt(format!("owner {}: {}", owner_id, e)))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::Corrupt(format!("owner {}: {}", owner_id, e)))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| StorageError::Corrupt(format!("owner {}: bad created_at: {}", owner_id, e)))?
            .with_timezone(&Utc);

        Ok(Account {
            owner_id,
            balance,
            created_at,
        })
    }
}

async fn fetch_accounts<'e, E>(executor: E) -> Result<Vec<Account>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT owner_id, balance, created_at FROM accounts ORDER BY owner_id")
        .fetch_all(executor)
        .await?;

    rows.iter()
        .map(|row| AccountStore::row_to_account(row).map_err(StoreError::from))
        .collect()
}

async fn fetch_total<'e, E>(executor: E) -> Result<Cents, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let total: Cents = sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM accounts")
        .fetch_one(executor)
        .await?;
    Ok(total)
}

/// `balance += delta` on a single row, against either the pool or an open
/// transaction. Exactly one row must match.
pub(crate) async fn apply_delta<'e, E>(executor: E, owner_id: OwnerId, delta: Cents) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE owner_id = ?")
        .bind(delta)
        .bind(owner_id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::AccountNotFound(owner_id));
    }
    Ok(())
}
