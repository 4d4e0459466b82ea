use std::time::Duration;

/// Runtime settings for the ledger and its storage pool.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite database file path (or `:memory:`).
    pub database: String,
    pub max_connections: u32,
    /// Idle pooled connections are closed after this long.
    pub idle_timeout: Duration,
    /// How long a statement waits for a lock held by another transaction before
    /// failing with a retryable conflict. Keep below `operation_timeout`.
    pub busy_timeout: Duration,
    /// Deadline for a whole ledger operation, transaction included.
    pub operation_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: "coffer.db".to_string(),
            max_connections: 25,
            idle_timeout: Duration::from_secs(15 * 60),
            busy_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(3),
        }
    }
}

impl LedgerConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database)
    }
}
