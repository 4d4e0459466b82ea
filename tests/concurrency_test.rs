mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use coffer::application::{LedgerError, LedgerService};
use coffer::storage::StorageError;
use common::{open_funded, test_service, test_service_with, total_balance};
use tokio::sync::Barrier;
use tokio::task::JoinSet;

/// Generous lock waits so contention resolves by queueing, not by timing out.
async fn contended_service() -> Result<(Arc<LedgerService>, tempfile::TempDir)> {
    let (service, temp) = test_service_with(|config| {
        config
            .with_busy_timeout(Duration::from_secs(10))
            .with_operation_timeout(Duration::from_secs(20))
    })
    .await?;
    Ok((Arc::new(service), temp))
}

/// Fire `count` transfers of `amount` from `from` to `to`, released together.
async fn race_transfers(
    service: &Arc<LedgerService>,
    count: usize,
    from: i64,
    to: i64,
    amount: i64,
) -> Vec<Result<(), LedgerError>> {
    let barrier = Arc::new(Barrier::new(count));
    let mut set = JoinSet::new();
    for _ in 0..count {
        let service = Arc::clone(service);
        let barrier = Arc::clone(&barrier);
        set.spawn(async move {
            barrier.wait().await;
            service.transfer(from, to, amount).await
        });
    }

    let mut results = Vec::with_capacity(count);
    while let Some(joined) = set.join_next().await {
        results.push(joined.expect("transfer task panicked"));
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_concurrent_overdrafts_only_one_wins() -> Result<()> {
    let (service, _temp) = contended_service().await?;
    open_funded(&service, 1, 100).await?;
    open_funded(&service, 2, 0).await?;

    let results = race_transfers(&service, 2, 1, 2, 60).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. })))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(insufficient, 1);

    assert_eq!(service.balance(1).await?, 40);
    assert_eq!(service.balance(2).await?, 60);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_drain_succeeds_exactly_floor_b_over_a_times() -> Result<()> {
    let (service, _temp) = contended_service().await?;
    let balance = 1000;
    let amount = 70;
    let attempts = 20;
    open_funded(&service, 1, balance).await?;
    open_funded(&service, 2, 0).await?;

    let results = race_transfers(&service, attempts, 1, 2, amount).await;

    let expected = (balance / amount) as usize;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. })))
        .count();
    assert_eq!(succeeded, expected);
    assert_eq!(insufficient, attempts - expected);

    assert_eq!(service.balance(1).await?, balance - expected as i64 * amount);
    assert_eq!(service.balance(2).await?, expected as i64 * amount);
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_account_creation_is_unique() -> Result<()> {
    let (service, _temp) = contended_service().await?;

    let attempts = 8;
    let barrier = Arc::new(Barrier::new(attempts));
    let mut set = JoinSet::new();
    for _ in 0..attempts {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        set.spawn(async move {
            barrier.wait().await;
            service.create_account(7).await
        });
    }

    let mut created = 0;
    let mut duplicates = 0;
    while let Some(joined) = set.join_next().await {
        match joined? {
            Ok(_) => created += 1,
            Err(LedgerError::DuplicateAccount(7)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(duplicates, attempts - 1);
    assert_eq!(service.list_accounts().await?.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossing_transfers_conserve_and_stay_non_negative() -> Result<()> {
    let (service, _temp) = contended_service().await?;
    open_funded(&service, 1, 500).await?;
    open_funded(&service, 2, 500).await?;
    open_funded(&service, 3, 500).await?;
    let before = total_balance(&service).await?;

    let routes = [(1, 2, 120), (2, 1, 90), (2, 3, 200), (3, 1, 310), (1, 3, 45), (3, 2, 75)];
    let mut set = JoinSet::new();
    for round in 0..5 {
        for &(from, to, amount) in &routes {
            let service = Arc::clone(&service);
            set.spawn(async move { service.transfer(from, to, amount + round).await });
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined? {
            Ok(()) | Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(err) if err.is_retryable() => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let report = service.check_integrity().await?;
    assert!(report.is_healthy());
    assert_eq!(report.total_balance, before);
    for account in service.list_accounts().await? {
        assert!(account.balance >= 0);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drain_under_default_timeouts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let balance = 10_000;
    let amount = 70;
    let attempts = 200;
    open_funded(&service, 1, balance).await?;
    open_funded(&service, 2, 0).await?;

    let results = race_transfers(&service, attempts, 1, 2, amount).await;

    let expected = (balance / amount) as usize;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. })))
        .count();
    assert_eq!(succeeded, expected);
    assert_eq!(insufficient, attempts - expected);
    assert_eq!(service.balance(1).await?, 60);
    assert_eq!(service.balance(2).await?, expected as i64 * amount);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_and_transfers_conserve_net() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    for owner in 1..=4 {
        open_funded(&service, owner, 100).await?;
    }
    let before = total_balance(&service).await?;
    assert_eq!(before, 400);

    let mut deposits = JoinSet::new();
    let mut transfers = JoinSet::new();
    for i in 0..20i64 {
        let service = Arc::clone(&service);
        deposits.spawn(async move { service.deposit(i % 4 + 1, 14).await });
    }
    for i in 0..40i64 {
        let service = Arc::clone(&service);
        let from = i % 4 + 1;
        let to = (i + 1) % 4 + 1;
        transfers.spawn(async move { service.transfer(from, to, 25 + i).await });
    }

    let mut deposited = 0;
    while let Some(joined) = deposits.join_next().await {
        joined??;
        deposited += 14;
    }
    while let Some(joined) = transfers.join_next().await {
        match joined? {
            Ok(()) | Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(err) if err.is_retryable() => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(deposited, 280);
    assert_eq!(total_balance(&service).await?, before + deposited);

    let report = service.check_integrity().await?;
    assert!(report.is_healthy());
    assert_eq!(report.total_balance, 680);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_locked_source_surfaces_retryable_conflict() -> Result<()> {
    let (service, _temp) = test_service_with(|config| {
        config
            .with_busy_timeout(Duration::from_millis(100))
            .with_operation_timeout(Duration::from_secs(10))
    })
    .await?;
    open_funded(&service, 1, 100).await?;
    open_funded(&service, 2, 0).await?;

    let mut holder = service.store().begin().await?;
    assert_eq!(holder.read_for_update(1).await?, 100);
    assert_eq!(holder.locked(), &[1]);

    let err = service.transfer(1, 2, 10).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Conflict(_))));
    assert!(err.is_retryable());

    holder.rollback().await?;

    // Resubmitting once the lock is gone goes through.
    service.transfer(1, 2, 10).await?;
    assert_eq!(service.balance(1).await?, 90);
    assert_eq!(service.balance(2).await?, 10);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_expiry_rolls_back() -> Result<()> {
    let (service, _temp) = test_service_with(|config| {
        config
            .with_busy_timeout(Duration::from_secs(1))
            .with_operation_timeout(Duration::from_millis(200))
    })
    .await?;
    open_funded(&service, 1, 100).await?;
    open_funded(&service, 2, 0).await?;

    let mut holder = service.store().begin().await?;
    holder.read_for_update(1).await?;

    let err = service.transfer(1, 2, 10).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Timeout(_))));
    assert!(!err.is_retryable());
    assert!(!err.is_client_error());

    holder.rollback().await?;

    assert_eq!(service.balance(1).await?, 100);
    assert_eq!(service.balance(2).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() -> Result<()> {
    let (service, _temp) = test_service_with(|config| config).await?;
    open_funded(&service, 1, 100).await?;

    {
        let mut tx = service.store().begin().await?;
        tx.read_for_update(1).await?;
        tx.increment_balance(1, -50).await?;
        // Dropped without commit.
    }

    assert_eq!(service.balance(1).await?, 100);

    // The row is lockable again.
    let mut tx = service.store().begin().await?;
    assert_eq!(tx.read_for_update(1).await?, 100);
    tx.increment_balance(1, -50).await?;
    tx.commit().await?;
    assert_eq!(service.balance(1).await?, 50);

    Ok(())
}
