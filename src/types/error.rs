//! Error types for the core banking engine
//!
//! Every failure surfaced to a caller carries a stable machine-readable
//! code (via [`EngineError::code`]) and a human-readable message that is
//! safe to return across a process boundary: no SQL, row versions, stack
//! traces, or other internal detail ever appears here.
//!
//! # Error categories
//!
//! - **Pre-transaction validation**: invalid amount or operation key,
//!   rejected before any store access.
//! - **Post-read validation**: account missing, not owned, not active,
//!   self-transfer, insufficient funds.
//! - **Idempotency**: a duplicate submission of an in-flight or already
//!   recorded operation key.
//! - **Concurrency**: the optimistic retry budget was exhausted.
//! - **Storage**: an unrecovered store failure.

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the banking engine
///
/// If an operation returns any of these, no journal entry was committed
/// for that call: the engine never surfaces partial success.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The amount failed a pre-transaction check
    ///
    /// Amounts must be strictly positive, at most 1,000,000,000, and carry
    /// no more than two decimal places.
    #[error("Invalid amount: {reason}")]
    InvalidAmount {
        /// Which bound was violated
        reason: String,
    },

    /// The operation key failed a pre-transaction check
    ///
    /// Keys are opaque strings of 1 to 100 characters.
    #[error("Invalid operation key: {reason}")]
    InvalidOperationKey {
        /// Which bound was violated
        reason: String,
    },

    /// The referenced account does not exist
    #[error("Account not found")]
    AccountNotFound,

    /// The caller does not own the account
    #[error("You are not permitted to operate on this account")]
    UnauthorizedAccess,

    /// The account is frozen; operational resolution is external
    #[error("Account {account_number} is frozen")]
    AccountFrozen {
        /// The frozen account's number
        account_number: String,
    },

    /// The account is closed; this is terminal
    #[error("Account {account_number} is closed")]
    AccountClosed {
        /// The closed account's number
        account_number: String,
    },

    /// Source and destination of a transfer are the same account
    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    /// The source account balance does not cover the requested amount
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Current cached balance
        available: Decimal,
        /// Requested debit
        requested: Decimal,
    },

    /// The operation key was already used
    ///
    /// Not retryable with the same key; the original result may be fetched
    /// via replay once recorded.
    #[error("Operation '{operation_key}' was already submitted")]
    DuplicateOperation {
        /// The duplicated key
        operation_key: String,
    },

    /// The optimistic retry budget was exhausted
    ///
    /// No side effects were committed; the caller may retry.
    #[error("Operation aborted after {attempts} conflicting attempts; please retry")]
    ConcurrencyConflict {
        /// How many attempts were made
        attempts: u32,
    },

    /// A bulk instruction file failed a file-level constraint
    ///
    /// Per-row problems never surface here; they become row failures in
    /// the bulk summary.
    #[error("Invalid bulk file: {reason}")]
    InvalidBulkFile {
        /// Which constraint was violated
        reason: String,
    },

    /// An unrecovered store failure
    #[error("Storage error: {message}")]
    Storage {
        /// Sanitized description of the failure
        message: String,
    },
}

impl EngineError {
    /// The stable machine-readable code for this error
    ///
    /// Codes survive across process boundaries; messages may evolve.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidAmount { .. } => "INVALID_AMOUNT",
            EngineError::InvalidOperationKey { .. } => "INVALID_OPERATION_KEY",
            EngineError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            EngineError::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            EngineError::AccountFrozen { .. } => "ACCOUNT_FROZEN",
            EngineError::AccountClosed { .. } => "ACCOUNT_CLOSED",
            EngineError::SelfTransfer => "SELF_TRANSFER",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::DuplicateOperation { .. } => "DUPLICATE_OPERATION",
            EngineError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            EngineError::InvalidBulkFile { .. } => "INVALID_FILE",
            EngineError::Storage { .. } => "STORAGE_ERROR",
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(reason: &str) -> Self {
        EngineError::InvalidAmount {
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidOperationKey error
    pub fn invalid_operation_key(reason: &str) -> Self {
        EngineError::InvalidOperationKey {
            reason: reason.to_string(),
        }
    }

    /// Create an AccountFrozen error
    pub fn account_frozen(account_number: &str) -> Self {
        EngineError::AccountFrozen {
            account_number: account_number.to_string(),
        }
    }

    /// Create an AccountClosed error
    pub fn account_closed(account_number: &str) -> Self {
        EngineError::AccountClosed {
            account_number: account_number.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(available: Decimal, requested: Decimal) -> Self {
        EngineError::InsufficientFunds {
            available,
            requested,
        }
    }

    /// Create a DuplicateOperation error
    pub fn duplicate_operation(operation_key: &str) -> Self {
        EngineError::DuplicateOperation {
            operation_key: operation_key.to_string(),
        }
    }

    /// Create an InvalidBulkFile error
    pub fn invalid_bulk_file(reason: &str) -> Self {
        EngineError::InvalidBulkFile {
            reason: reason.to_string(),
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        EngineError::Storage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case::invalid_amount(EngineError::invalid_amount("too small"), "INVALID_AMOUNT")]
    #[case::not_found(EngineError::AccountNotFound, "ACCOUNT_NOT_FOUND")]
    #[case::unauthorized(EngineError::UnauthorizedAccess, "UNAUTHORIZED_ACCESS")]
    #[case::frozen(EngineError::account_frozen("CHK-20250101-AB12CD"), "ACCOUNT_FROZEN")]
    #[case::closed(EngineError::account_closed("CHK-20250101-AB12CD"), "ACCOUNT_CLOSED")]
    #[case::self_transfer(EngineError::SelfTransfer, "SELF_TRANSFER")]
    #[case::insufficient(
        EngineError::insufficient_funds(dec!(50), dec!(100)),
        "INSUFFICIENT_FUNDS"
    )]
    #[case::duplicate(EngineError::duplicate_operation("k1"), "DUPLICATE_OPERATION")]
    #[case::conflict(
        EngineError::ConcurrencyConflict { attempts: 3 },
        "CONCURRENCY_CONFLICT"
    )]
    #[case::storage(EngineError::storage("backend unavailable"), "STORAGE_ERROR")]
    fn test_error_codes(#[case] error: EngineError, #[case] expected: &str) {
        assert_eq!(error.code(), expected);
    }

    #[test]
    fn test_insufficient_funds_display() {
        let error = EngineError::insufficient_funds(dec!(50.00), dec!(100.00));
        assert_eq!(
            error.to_string(),
            "Insufficient funds: available 50.00, requested 100.00"
        );
    }

    #[test]
    fn test_messages_carry_no_internal_detail() {
        let error = EngineError::ConcurrencyConflict { attempts: 3 };
        let message = error.to_string();
        assert!(!message.contains("version"));
        assert!(!message.contains("SQL"));
    }
}
