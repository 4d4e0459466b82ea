use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Stable identifier of the account owner, as handed over by the identity layer.
/// One owner holds at most one account.
pub type OwnerId = i64;

/// A single balance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner_id: OwnerId,
    /// Balance in the smallest currency unit. Never negative.
    pub balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly opened account starts empty.
    pub fn open(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            balance: 0,
            created_at: Utc::now(),
        }
    }
}

/// Whether a balance is enough to pay `amount` without going below zero.
pub fn covers(balance: Cents, amount: Cents) -> bool {
    balance >= amount
}
