use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default number of rows per streaming batch
const DEFAULT_BATCH_SIZE: usize = 500;

/// Process bulk banking operations against an in-memory ledger
#[derive(Parser, Debug)]
#[command(name = "bank-core")]
#[command(
    about = "Process bulk deposit/withdraw instructions through the core banking engine",
    long_about = None
)]
pub struct CliArgs {
    /// Operations CSV file (`NationalId,Amount,Operation`)
    #[arg(value_name = "OPERATIONS", help = "Path to the operations CSV file")]
    pub operations_file: PathBuf,

    /// Seed CSV file creating verified users with checking accounts
    #[arg(
        long = "seed",
        value_name = "SEED",
        help = "Path to the seed CSV file (national_id,name,balance)"
    )]
    pub seed_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "sync",
        help = "Processing strategy: 'sync' for in-order or 'async' for user-partitioned streaming"
    )]
    pub strategy: StrategyType,

    /// Number of rows per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Rows per streaming batch (default: 500)"
    )]
    pub batch_size: Option<usize>,
}

/// Available bulk processing strategies
#[derive(Clone, Debug, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Effective batch size for the streaming strategy
    ///
    /// Zero falls back to the default with a warning, matching how other
    /// out-of-range knobs are handled.
    pub fn effective_batch_size(&self) -> usize {
        match self.batch_size {
            Some(0) => {
                eprintln!(
                    "Warning: Invalid batch-size (0), using default ({})",
                    DEFAULT_BATCH_SIZE
                );
                DEFAULT_BATCH_SIZE
            }
            Some(size) => size,
            None => DEFAULT_BATCH_SIZE,
        }
    }
}
