use serde::Serialize;

use super::{Account, Cents, OwnerId};

/// Snapshot of ledger-wide invariants.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    /// Sum of the listed balances.
    pub total_balance: Cents,
    /// Sum computed by the storage engine over the same snapshot.
    pub stored_total: Cents,
    /// Accounts found below zero. Must always be empty.
    pub negative_accounts: Vec<OwnerId>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.negative_accounts.is_empty() && self.total_balance == self.stored_total
    }

    pub fn issues(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .negative_accounts
            .iter()
            .map(|owner| format!("account {} has a negative balance", owner))
            .collect();
        if self.total_balance != self.stored_total {
            issues.push(format!(
                "listed balances sum to {} but storage reports {}",
                self.total_balance, self.stored_total
            ));
        }
        issues
    }
}

/// Build an integrity report from a full account listing and the storage-side
/// total taken in the same snapshot.
pub fn build_integrity_report(accounts: &[Account], stored_total: Cents) -> IntegrityReport {
    IntegrityReport {
        account_count: accounts.len(),
        total_balance: accounts.iter().map(|a| a.balance).sum(),
        stored_total,
        negative_accounts: accounts
            .iter()
            .filter(|a| a.balance < 0)
            .map(|a| a.owner_id)
            .collect(),
    }
}
