//! Core Banking Engine CLI
//!
//! Processes a bulk instruction file through the banking engine against an
//! in-memory ledger seeded from an accounts file.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --seed accounts.csv operations.csv > results.csv
//! cargo run -- --seed accounts.csv --strategy async operations.csv > results.csv
//! cargo run -- --seed accounts.csv --strategy async --batch-size 200 operations.csv
//! ```
//!
//! The seed file (`national_id,name,balance`, with header) creates one
//! verified user with an active checking account per row; positive
//! balances are journaled as opening deposits so the ledger invariants
//! hold from the start. The operations file follows the bulk format
//! (`NationalId,Amount,Operation`). Per-row results are written to stdout
//! as CSV.
//!
//! # Exit codes
//!
//! - 0: the batch was processed (individual rows may still have failed)
//! - 1: fatal error (unreadable files, bad header, no data rows, etc.)

use std::path::Path;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use bank_core::cli::{self, StrategyType};
use bank_core::{
    write_summary_csv, BankingEngine, BulkProcessor, BulkSummary, KycStatus, MemoryStore,
    StreamingBulkProcessor,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let store = MemoryStore::new();
    let engine = Arc::new(BankingEngine::new(store.clone()));

    if let Err(message) = seed_store(&store, &engine, &args.seed_file) {
        eprintln!("Error: {}", message);
        process::exit(1);
    }

    // Authentication and role checks are external collaborators; the CLI
    // session acts as one pre-authenticated employee.
    let operator = uuid::Uuid::new_v4();

    let summary = match run(&args, &engine, operator) {
        Ok(summary) => summary,
        Err(message) => {
            eprintln!("Error: {}", message);
            process::exit(1);
        }
    };

    let mut output = std::io::stdout();
    if let Err(message) = write_summary_csv(&summary, &mut output) {
        eprintln!("Error: {}", message);
        process::exit(1);
    }

    eprintln!(
        "Processed {} rows: {} succeeded, {} failed",
        summary.total, summary.success_count, summary.failure_count
    );
}

/// Run the selected bulk processing strategy
fn run(
    args: &cli::CliArgs,
    engine: &Arc<BankingEngine<MemoryStore>>,
    operator: uuid::Uuid,
) -> Result<BulkSummary, String> {
    let filename = args
        .operations_file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "operations.csv".to_string());

    match args.strategy {
        StrategyType::Sync => {
            let file = std::fs::File::open(&args.operations_file).map_err(|e| {
                format!(
                    "Failed to open file '{}': {}",
                    args.operations_file.display(),
                    e
                )
            })?;
            BulkProcessor::new(Arc::clone(engine))
                .process(operator, file, &filename)
                .map_err(|e| e.to_string())
        }
        StrategyType::Async => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(num_cpus::get())
                .build()
                .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;
            runtime.block_on(async {
                StreamingBulkProcessor::new(Arc::clone(engine))
                    .process_file(operator, &args.operations_file, args.effective_batch_size())
                    .await
                    .map_err(|e| e.to_string())
            })
        }
    }
}

/// Seed the in-memory store from the accounts file
///
/// Each row creates a verified user with an active checking account; a
/// positive balance is journaled as an opening deposit through the
/// engine so the balance identity holds from the first row.
fn seed_store(
    store: &MemoryStore,
    engine: &Arc<BankingEngine<MemoryStore>>,
    path: &Path,
) -> Result<(), String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open seed file '{}': {}", path.display(), e))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("Seed row {}: {}", index + 1, e))?;
        if record.len() != 3 {
            return Err(format!(
                "Seed row {}: expected 3 fields (national_id,name,balance), found {}",
                index + 1,
                record.len()
            ));
        }

        let national_id = record[0].trim();
        let name = record[1].trim();
        let balance = Decimal::from_str(record[2].trim())
            .map_err(|_| format!("Seed row {}: invalid balance '{}'", index + 1, &record[2]))?;

        let user = store
            .create_user(national_id, name, KycStatus::Verified)
            .map_err(|e| format!("Seed row {}: {}", index + 1, e))?;
        let account = store
            .create_account(user.id, bank_core::AccountType::Checking, "USD")
            .map_err(|e| format!("Seed row {}: {}", index + 1, e))?;

        if balance > Decimal::ZERO {
            engine
                .deposit(
                    user.id,
                    account.id,
                    balance,
                    Some("Opening balance"),
                    None,
                )
                .map_err(|e| format!("Seed row {}: {}", index + 1, e))?;
        }
    }

    Ok(())
}
