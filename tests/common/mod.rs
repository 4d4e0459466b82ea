// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use coffer::application::LedgerService;
use coffer::config::LedgerConfig;
use coffer::domain::{Cents, OwnerId};
use tempfile::TempDir;

/// Config pointing at a fresh database file inside `temp_dir`.
pub fn test_config(temp_dir: &TempDir) -> LedgerConfig {
    let db_path = temp_dir.path().join("test.db");
    LedgerConfig::new(db_path.to_str().unwrap())
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&test_config(&temp_dir)).await?;
    Ok((service, temp_dir))
}

/// Same as [`test_service`] with a custom config tweak.
pub async fn test_service_with(
    tweak: impl FnOnce(LedgerConfig) -> LedgerConfig,
) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&tweak(test_config(&temp_dir))).await?;
    Ok((service, temp_dir))
}

/// Open an account and fund it in one go.
pub async fn open_funded(service: &LedgerService, owner: OwnerId, balance: Cents) -> Result<()> {
    service.create_account(owner).await?;
    if balance > 0 {
        service.deposit(owner, balance).await?;
    }
    Ok(())
}

/// Sum of every balance in the ledger, as the storage engine computes it.
pub async fn total_balance(service: &LedgerService) -> Result<Cents> {
    Ok(service.store().total_balance().await?)
}
