mod error;
mod store;
mod transaction;

pub use error::*;
pub use store::*;
pub use transaction::*;

/// SQL migration for the accounts table
pub const MIGRATION_001_ACCOUNTS: &str = include_str!("migrations/001_accounts.sql");
