use std::fmt;

/// Steps of the two-party transfer protocol, in the order they run.
///
/// A transfer succeeds only by passing through every stage up to `Commit`.
/// A failure at any stage rolls the whole unit of work back; the stage is kept
/// around so the failure can be reported with where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransferStage {
    Begin,
    LockSource,
    CheckBalance,
    Debit,
    Credit,
    Commit,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Begin => "begin",
            TransferStage::LockSource => "lock_source",
            TransferStage::CheckBalance => "check_balance",
            TransferStage::Debit => "debit",
            TransferStage::Credit => "credit",
            TransferStage::Commit => "commit",
        }
    }

    /// The stage that follows this one, or `None` once committed.
    pub fn next(self) -> Option<Self> {
        match self {
            TransferStage::Begin => Some(TransferStage::LockSource),
            TransferStage::LockSource => Some(TransferStage::CheckBalance),
            TransferStage::CheckBalance => Some(TransferStage::Debit),
            TransferStage::Debit => Some(TransferStage::Credit),
            TransferStage::Credit => Some(TransferStage::Commit),
            TransferStage::Commit => None,
        }
    }

    /// Move to the next stage. Stays put once committed.
    pub fn advance(&mut self) {
        if let Some(next) = self.next() {
            *self = next;
        }
    }

    /// Whether the source balance has already been touched inside the transaction.
    /// Rolling back from these stages undoes a debit.
    pub fn has_debited(&self) -> bool {
        *self > TransferStage::Debit
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
