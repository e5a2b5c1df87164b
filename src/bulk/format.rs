//! Bulk instruction file format
//!
//! This module centralizes the tabular format concerns of the bulk
//! processor, keeping them pure (no I/O, no engine access):
//! - header recognition (case- and whitespace-insensitive)
//! - per-row field parsing
//! - the per-row result and summary shapes
//! - summary output serialization
//!
//! The accepted input is UTF-8 CSV with header `NationalId,Amount,Operation`
//! and data rows of exactly three comma-separated fields. No quoting or
//! escaping is supported; embedded commas are not a thing in this format.

use std::io::Write;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest accepted input, in bytes (5 MiB)
pub const MAX_INPUT_BYTES: u64 = 5 * 1024 * 1024;

/// The three expected header names, normalized
const EXPECTED_HEADER: [&str; 3] = ["nationalid", "amount", "operation"];

/// Which engine operation a bulk row requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkOperation {
    /// Credit the row's amount to the resolved account
    Deposit,

    /// Debit the row's amount from the resolved account
    Withdraw,
}

impl BulkOperation {
    /// Parse the operation column (case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "DEPOSIT" => Some(BulkOperation::Deposit),
            "WITHDRAW" => Some(BulkOperation::Withdraw),
            _ => None,
        }
    }

    /// Canonical uppercase spelling
    pub fn as_str(self) -> &'static str {
        match self {
            BulkOperation::Deposit => "DEPOSIT",
            BulkOperation::Withdraw => "WITHDRAW",
        }
    }
}

/// A successfully parsed data row
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// The national ID to resolve a user by
    pub national_id: String,

    /// The positive amount to move
    pub amount: Decimal,

    /// Deposit or Withdraw
    pub operation: BulkOperation,
}

/// Normalize a header field: strip all whitespace, lowercase
fn normalize_header_field(field: &str) -> String {
    field
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Validate the header row
///
/// The match is case- and whitespace-insensitive on the three column
/// names, in order.
pub fn validate_header(fields: &[String]) -> Result<(), String> {
    if fields.len() != EXPECTED_HEADER.len() {
        return Err(format!(
            "header must have exactly {} columns, found {}",
            EXPECTED_HEADER.len(),
            fields.len()
        ));
    }
    for (field, expected) in fields.iter().zip(EXPECTED_HEADER) {
        if normalize_header_field(field) != expected {
            return Err(format!(
                "unexpected header column '{}', expected '{}'",
                field.trim(),
                expected
            ));
        }
    }
    Ok(())
}

/// Parse one data row into its three fields
///
/// Returns a row-scoped error message on a malformed field; the caller
/// turns that into a row failure and continues with the next row.
pub fn parse_row(fields: &[String]) -> Result<ParsedRow, String> {
    if fields.len() != 3 {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    }

    let national_id = fields[0].trim().to_string();
    let amount = Decimal::from_str(fields[1].trim())
        .map_err(|_| format!("invalid amount '{}'", fields[1].trim()))?;
    if amount <= Decimal::ZERO {
        return Err(format!("amount must be positive, got '{}'", fields[1].trim()));
    }
    let operation = BulkOperation::parse(&fields[2])
        .ok_or_else(|| format!("unknown operation '{}'", fields[2].trim()))?;

    Ok(ParsedRow {
        national_id,
        amount,
        operation,
    })
}

/// Outcome of one data row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowResult {
    /// 1-based row number over data rows
    pub row: usize,

    /// The national ID as parsed from the row (may be empty on a
    /// malformed row)
    pub national_id: String,

    /// The parsed amount, if the row parsed
    pub amount: Option<Decimal>,

    /// The parsed operation, if the row parsed
    pub operation: Option<BulkOperation>,

    /// Whether the engine committed the row's operation
    pub success: bool,

    /// Row-scoped error message on failure
    pub error: Option<String>,

    /// The resolved account's number, when the row got that far
    pub account_number: Option<String>,

    /// The account balance after the row's operation
    pub balance: Option<Decimal>,
}

impl RowResult {
    /// A failed row
    pub fn failure(
        row: usize,
        national_id: String,
        amount: Option<Decimal>,
        operation: Option<BulkOperation>,
        error: String,
    ) -> Self {
        RowResult {
            row,
            national_id,
            amount,
            operation,
            success: false,
            error: Some(error),
            account_number: None,
            balance: None,
        }
    }
}

/// Summary of one bulk run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkSummary {
    /// Number of data rows
    pub total: usize,

    /// Rows whose operation committed
    pub success_count: usize,

    /// Rows that failed parsing, resolution, or execution
    pub failure_count: usize,

    /// Per-row outcomes, ordered by row number
    pub rows: Vec<RowResult>,
}

impl BulkSummary {
    /// Assemble a summary, sorting rows back into file order
    ///
    /// Concurrent processing hands rows back in completion order; the
    /// summary presents them by row number.
    pub fn from_rows(mut rows: Vec<RowResult>) -> Self {
        rows.sort_by_key(|row| row.row);
        let total = rows.len();
        let success_count = rows.iter().filter(|row| row.success).count();
        BulkSummary {
            total,
            success_count,
            failure_count: total - success_count,
            rows,
        }
    }
}

/// Write a bulk summary's per-row results as CSV
///
/// Columns: row, national_id, amount, operation, success, error,
/// account_number, balance. Rows are already in file order.
pub fn write_summary_csv(summary: &BulkSummary, output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record([
            "row",
            "national_id",
            "amount",
            "operation",
            "success",
            "error",
            "account_number",
            "balance",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for row in &summary.rows {
        writer
            .write_record(&[
                row.row.to_string(),
                row.national_id.clone(),
                row.amount.map(|a| a.to_string()).unwrap_or_default(),
                row.operation.map(|o| o.as_str().to_string()).unwrap_or_default(),
                row.success.to_string(),
                row.error.clone().unwrap_or_default(),
                row.account_number.clone().unwrap_or_default(),
                row.balance.map(|b| b.to_string()).unwrap_or_default(),
            ])
            .map_err(|e| format!("Failed to write row record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
