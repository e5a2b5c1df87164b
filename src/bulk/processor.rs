//! Synchronous bulk instruction processor
//!
//! Drives the banking engine once per data row of a CSV instruction
//! file. Per-row failures (malformed fields, unresolvable users, engine
//! rejections like insufficient funds) become failure rows in the
//! summary and never abort the batch. Only file-level problems
//! (unreadable input, bad header, size cap, zero data rows) fail the
//! whole run.
//!
//! Each row is submitted with a deterministic operation key
//! `CSV-{filename}-{row}-{timestamp}`. Because the timestamp is taken at
//! processing time, replaying the same file produces fresh keys and
//! re-executes every row; a file is expected to be submitted once.

use std::io::Read;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::core::engine::BankingEngine;
use crate::store::Store;
use crate::types::{EngineError, KycStatus, UserId};

use super::format::{self, BulkOperation, BulkSummary, ParsedRow, RowResult, MAX_INPUT_BYTES};

/// Row-by-row driver over the banking engine
#[derive(Debug)]
pub struct BulkProcessor<S: Store> {
    engine: Arc<BankingEngine<S>>,
}

impl<S: Store> Clone for BulkProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: Store> BulkProcessor<S> {
    /// Create a processor over a shared engine
    pub fn new(engine: Arc<BankingEngine<S>>) -> Self {
        Self { engine }
    }

    /// Process a complete instruction file from any reader
    ///
    /// `operator_id` identifies the pre-authenticated employee submitting
    /// the batch; role enforcement is the caller's responsibility. It is
    /// recorded in the audit log event, not used for per-row ownership
    /// (each row acts as its own resolved user).
    ///
    /// # Errors
    ///
    /// `INVALID_FILE` if the input cannot be read, exceeds 5 MiB, has a
    /// bad header, or contains no data rows. Individual row problems are
    /// reported in the summary instead.
    pub fn process(
        &self,
        operator_id: UserId,
        input: impl Read,
        filename: &str,
    ) -> Result<BulkSummary, EngineError> {
        let mut limited = input.take(MAX_INPUT_BYTES + 1);
        let mut buffer = Vec::new();
        limited
            .read_to_end(&mut buffer)
            .map_err(|error| EngineError::invalid_bulk_file(&format!("unreadable input: {error}")))?;
        if buffer.len() as u64 > MAX_INPUT_BYTES {
            return Err(EngineError::invalid_bulk_file("input exceeds the 5 MiB limit"));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(buffer.as_slice());

        let mut rows = Vec::new();
        let mut header_seen = false;
        let mut row_number = 0usize;

        for record in reader.records() {
            match record {
                Ok(record) => {
                    let fields: Vec<String> = record.iter().map(str::to_string).collect();
                    if !header_seen {
                        format::validate_header(&fields)
                            .map_err(|reason| EngineError::invalid_bulk_file(&reason))?;
                        header_seen = true;
                        continue;
                    }
                    row_number += 1;
                    rows.push(self.process_row(row_number, &fields, filename));
                }
                Err(error) => {
                    if !header_seen {
                        return Err(EngineError::invalid_bulk_file(&format!(
                            "unreadable header: {error}"
                        )));
                    }
                    row_number += 1;
                    rows.push(RowResult::failure(
                        row_number,
                        String::new(),
                        None,
                        None,
                        format!("unreadable row: {error}"),
                    ));
                }
            }
        }

        if !header_seen {
            return Err(EngineError::invalid_bulk_file("input is empty"));
        }
        if rows.is_empty() {
            return Err(EngineError::invalid_bulk_file(
                "input must contain at least one data row",
            ));
        }

        let summary = BulkSummary::from_rows(rows);
        info!(
            operator = %operator_id,
            filename,
            total = summary.total,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "bulk run completed"
        );
        Ok(summary)
    }

    /// Process one data row in isolation
    pub(crate) fn process_row(&self, row: usize, fields: &[String], filename: &str) -> RowResult {
        let national_id = fields
            .first()
            .map(|field| field.trim().to_string())
            .unwrap_or_default();
        match format::parse_row(fields) {
            Err(message) => RowResult::failure(row, national_id, None, None, message),
            Ok(parsed) => self.execute_row(row, &parsed, filename),
        }
    }

    /// Resolve the row's user and account, then invoke the engine
    fn execute_row(&self, row: usize, parsed: &ParsedRow, filename: &str) -> RowResult {
        let store = self.engine.store();

        let user = match store.user_by_national_id(&parsed.national_id) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return self.row_failure(row, parsed, "no user with this national id".to_string())
            }
            Err(error) => return self.row_failure(row, parsed, format!("storage error: {error}")),
        };
        if user.kyc_status != KycStatus::Verified {
            return self.row_failure(row, parsed, "user is not KYC verified".to_string());
        }

        let account = match store.active_checking_account(user.id) {
            Ok(Some(account)) => account,
            Ok(None) => {
                return self.row_failure(
                    row,
                    parsed,
                    "user has no active checking account".to_string(),
                )
            }
            Err(error) => return self.row_failure(row, parsed, format!("storage error: {error}")),
        };

        let operation_key = format!(
            "CSV-{}-{}-{}",
            filename,
            row,
            Utc::now().timestamp_millis()
        );
        let description = match parsed.operation {
            BulkOperation::Deposit => format!("Bulk deposit from {filename}"),
            BulkOperation::Withdraw => format!("Bulk withdrawal from {filename}"),
        };

        let result = match parsed.operation {
            BulkOperation::Deposit => self.engine.deposit(
                user.id,
                account.id,
                parsed.amount,
                Some(&description),
                Some(&operation_key),
            ),
            BulkOperation::Withdraw => self.engine.withdraw(
                user.id,
                account.id,
                parsed.amount,
                Some(&description),
                Some(&operation_key),
            ),
        };

        match result {
            Ok(receipt) => RowResult {
                row,
                national_id: parsed.national_id.clone(),
                amount: Some(parsed.amount),
                operation: Some(parsed.operation),
                success: true,
                error: None,
                account_number: Some(receipt.account_number),
                balance: Some(receipt.balance),
            },
            Err(error) => self.row_failure(row, parsed, error.to_string()),
        }
    }

    fn row_failure(&self, row: usize, parsed: &ParsedRow, message: String) -> RowResult {
        RowResult::failure(
            row,
            parsed.national_id.clone(),
            Some(parsed.amount),
            Some(parsed.operation),
            message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::AccountType;
    use rust_decimal_macros::dec;
    use std::io::Cursor;
    use uuid::Uuid;

    fn setup() -> (MemoryStore, BulkProcessor<MemoryStore>) {
        let store = MemoryStore::new();
        let engine = Arc::new(BankingEngine::new(store.clone()));
        (store, BulkProcessor::new(engine))
    }

    fn seed_verified_user(store: &MemoryStore, national_id: &str, opening: rust_decimal::Decimal) {
        let user = store
            .create_user(national_id, "Seeded User", KycStatus::Verified)
            .unwrap();
        let account = store
            .create_account(user.id, AccountType::Checking, "USD")
            .unwrap();
        if opening > rust_decimal::Decimal::ZERO {
            let engine = BankingEngine::new(store.clone());
            engine
                .deposit(user.id, account.id, opening, Some("Opening balance"), None)
                .unwrap();
        }
    }

    #[test]
    fn test_process_mixed_rows_isolates_failures() {
        let (store, processor) = setup();
        seed_verified_user(&store, "1111111111", dec!(100));
        seed_verified_user(&store, "2222222222", dec!(0));

        let csv = "NationalId,Amount,Operation\n\
                   1111111111,50.00,DEPOSIT\n\
                   1111111111,abc,DEPOSIT\n\
                   2222222222,10.00,WITHDRAW\n\
                   9999999999,5.00,DEPOSIT\n\
                   1111111111,25.00,WITHDRAW\n";

        let summary = processor
            .process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv")
            .unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 3);

        assert!(summary.rows[0].success);
        assert_eq!(summary.rows[0].balance, Some(dec!(150.00)));

        assert!(!summary.rows[1].success);
        assert!(summary.rows[1].error.as_deref().unwrap().contains("invalid amount"));

        // Insufficient funds is a row failure, not a batch failure.
        assert!(!summary.rows[2].success);
        assert!(summary.rows[2]
            .error
            .as_deref()
            .unwrap()
            .contains("Insufficient funds"));

        assert!(!summary.rows[3].success);
        assert!(summary.rows[3]
            .error
            .as_deref()
            .unwrap()
            .contains("no user with this national id"));

        assert!(summary.rows[4].success);
        assert_eq!(summary.rows[4].balance, Some(dec!(125.00)));
    }

    #[test]
    fn test_unverified_user_is_rejected_per_row() {
        let (store, processor) = setup();
        let user = store
            .create_user("3333333333", "Pending User", KycStatus::Pending)
            .unwrap();
        store
            .create_account(user.id, AccountType::Checking, "USD")
            .unwrap();

        let csv = "NationalId,Amount,Operation\n3333333333,10.00,DEPOSIT\n";
        let summary = processor
            .process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv")
            .unwrap();

        assert_eq!(summary.failure_count, 1);
        assert!(summary.rows[0]
            .error
            .as_deref()
            .unwrap()
            .contains("not KYC verified"));
    }

    #[test]
    fn test_user_without_checking_account_is_rejected_per_row() {
        let (store, processor) = setup();
        let user = store
            .create_user("4444444444", "Saver", KycStatus::Verified)
            .unwrap();
        store
            .create_account(user.id, AccountType::Savings, "USD")
            .unwrap();

        let csv = "NationalId,Amount,Operation\n4444444444,10.00,DEPOSIT\n";
        let summary = processor
            .process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv")
            .unwrap();

        assert_eq!(summary.failure_count, 1);
        assert!(summary.rows[0]
            .error
            .as_deref()
            .unwrap()
            .contains("no active checking account"));
    }

    #[test]
    fn test_bad_header_fails_the_file() {
        let (_, processor) = setup();

        let csv = "Id,Amount,Operation\n1111111111,10.00,DEPOSIT\n";
        let result = processor.process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv");
        assert_eq!(result.unwrap_err().code(), "INVALID_FILE");
    }

    #[test]
    fn test_header_only_file_is_rejected() {
        let (_, processor) = setup();

        let csv = "NationalId,Amount,Operation\n";
        let result = processor.process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv");
        assert_eq!(result.unwrap_err().code(), "INVALID_FILE");
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let (_, processor) = setup();

        let result = processor.process(Uuid::new_v4(), Cursor::new(b"" as &[u8]), "ops.csv");
        assert_eq!(result.unwrap_err().code(), "INVALID_FILE");
    }

    #[test]
    fn test_oversized_input_is_rejected() {
        let (_, processor) = setup();

        let mut big = String::from("NationalId,Amount,Operation\n");
        let row = "1111111111,10.00,DEPOSIT\n";
        while (big.len() as u64) <= MAX_INPUT_BYTES {
            big.push_str(row);
        }

        let result = processor.process(Uuid::new_v4(), Cursor::new(big.as_bytes()), "ops.csv");
        assert_eq!(result.unwrap_err().code(), "INVALID_FILE");
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let (store, processor) = setup();
        seed_verified_user(&store, "5555555555", dec!(0));

        let csv = "\nNationalId,Amount,Operation\n\n5555555555,10.00,DEPOSIT\n\n";
        let summary = processor
            .process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv")
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.success_count, 1);
    }

    #[test]
    fn test_row_keys_are_distinct_per_row() {
        let (store, processor) = setup();
        seed_verified_user(&store, "6666666666", dec!(0));

        // Two identical rows must both execute: their keys differ by row
        // number even within the same millisecond.
        let csv = "NationalId,Amount,Operation\n\
                   6666666666,10.00,DEPOSIT\n\
                   6666666666,10.00,DEPOSIT\n";
        let summary = processor
            .process(Uuid::new_v4(), Cursor::new(csv.as_bytes()), "ops.csv")
            .unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.rows[1].balance, Some(dec!(20.00)));
    }
}
