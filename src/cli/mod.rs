use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::{LedgerError, LedgerService};
use crate::config::LedgerConfig;
use crate::domain::{Cents, OwnerId, format_cents, parse_cents};

/// Coffer - account ledger with atomic transfers
#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Open accounts, deposit funds and move money between them atomically")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COFFER_DATABASE", default_value = "coffer.db")]
    pub database: String,

    /// Maximum pooled database connections
    #[arg(long, env = "COFFER_MAX_CONNECTIONS", default_value_t = 25)]
    pub max_connections: u32,

    /// Per-operation deadline in milliseconds
    #[arg(long, env = "COFFER_OPERATION_TIMEOUT_MS", default_value_t = 3000)]
    pub operation_timeout_ms: u64,

    /// How long to wait on a locked account before giving up, in milliseconds
    #[arg(long, env = "COFFER_BUSY_TIMEOUT_MS", default_value_t = 2000)]
    pub busy_timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open an account for an owner
    Open {
        /// Owner identifier
        owner: OwnerId,
    },

    /// Deposit funds into an account
    Deposit {
        /// Owner identifier
        owner: OwnerId,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,
    },

    /// Transfer funds between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source owner
        #[arg(long)]
        from: OwnerId,

        /// Destination owner
        #[arg(long)]
        to: OwnerId,
    },

    /// Show balance for an account or all accounts
    Balance {
        /// Owner identifier (omit for all accounts)
        owner: Option<OwnerId>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check whether an account exists
    Exists {
        /// Owner identifier
        owner: OwnerId,
    },

    /// Verify ledger integrity
    Check,
}

impl Cli {
    pub fn config(&self) -> LedgerConfig {
        LedgerConfig::new(self.database.clone())
            .with_max_connections(self.max_connections)
            .with_operation_timeout(Duration::from_millis(self.operation_timeout_ms))
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();

        let service = match self.command {
            Commands::Init => {
                let service = LedgerService::init(&config).await?;
                println!("Database initialized: {}", config.database);
                service
            }
            _ => LedgerService::connect(&config).await?,
        };

        let outcome = dispatch(&service, self.command).await;
        service.store().close().await;
        outcome
    }
}

async fn dispatch(service: &LedgerService, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {}

        Commands::Open { owner } => {
            let account = service.create_account(owner).await.map_err(describe)?;
            println!(
                "Opened account for owner {} ({})",
                account.owner_id,
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        Commands::Deposit { owner, amount } => {
            let amount_cents = parse_amount(&amount)?;
            service.deposit(owner, amount_cents).await.map_err(describe)?;
            println!("Deposited {} into account {}", format_cents(amount_cents), owner);
        }

        Commands::Transfer { amount, from, to } => {
            let amount_cents = parse_amount(&amount)?;

            // Counterparty pre-check, as the adapter contract expects.
            if !service.exists(to).await.map_err(describe)? {
                return Err(describe(LedgerError::AccountNotFound(to)));
            }

            service
                .transfer(from, to, amount_cents)
                .await
                .map_err(describe)?;
            println!(
                "Transferred {}: {} -> {}",
                format_cents(amount_cents),
                from,
                to
            );
        }

        Commands::Balance { owner, json } => run_balance_command(service, owner, json).await?,

        Commands::Exists { owner } => {
            let found = service.exists(owner).await.map_err(describe)?;
            println!("{}", if found { "yes" } else { "no" });
        }

        Commands::Check => run_check_command(service).await?,
    }
    Ok(())
}

/// Parse a user-entered amount; the ledger only ever sees positive cents.
fn parse_amount(input: &str) -> Result<Cents> {
    let cents =
        parse_cents(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))?;
    if cents <= 0 {
        anyhow::bail!("Amount must be greater than zero");
    }
    Ok(cents)
}

/// Attach a hint about who can fix the problem.
fn describe(err: LedgerError) -> anyhow::Error {
    if err.is_retryable() {
        anyhow::Error::new(err).context("Account is busy, try again")
    } else if err.is_client_error() {
        anyhow::Error::new(err)
    } else {
        anyhow::Error::new(err).context("The ledger could not process the request; no changes were made")
    }
}

async fn run_balance_command(
    service: &LedgerService,
    owner: Option<OwnerId>,
    json: bool,
) -> Result<()> {
    match owner {
        Some(owner) => {
            let account = service.account(owner).await.map_err(describe)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                println!("{}: {}", account.owner_id, format_cents(account.balance));
            }
        }
        None => {
            let accounts = service.list_accounts().await.map_err(describe)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:>14} {:<20}", "OWNER", "BALANCE", "OPENED");
                println!("{}", "-".repeat(56));
                for account in accounts {
                    println!(
                        "{:<20} {:>14} {:<20}",
                        account.owner_id,
                        format_cents(account.balance),
                        account.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await.map_err(describe)?;

    println!("Accounts:      {}", report.account_count);
    println!("Total balance: {}", format_cents(report.total_balance));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in report.issues() {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}
