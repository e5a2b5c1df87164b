//! Pure validation checks for monetary operations
//!
//! Two families of checks live here. The pre-transaction checks
//! ([`validate_amount`], [`validate_operation_key`]) depend only on the
//! inputs and run before any store access, so obviously bad requests are
//! rejected cheaply. The post-read checks ([`ensure_owned`],
//! [`ensure_active`], [`ensure_sufficient_funds`]) depend on database
//! state and are asserted inside the transaction, after the affected
//! accounts have been read.
//!
//! All functions are pure and synchronous; none of them suspends or
//! touches the store.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{Account, AccountStatus, EngineError, UserId};

/// Largest amount a single operation may move
pub const MAX_OPERATION_AMOUNT: Decimal = dec!(1_000_000_000);

/// Longest accepted operation key
pub const OPERATION_KEY_MAX_LEN: usize = 100;

/// Validate an operation amount
///
/// # Errors
///
/// Returns `INVALID_AMOUNT` if the amount is not strictly positive,
/// exceeds [`MAX_OPERATION_AMOUNT`], or carries sub-cent precision.
pub fn validate_amount(amount: Decimal) -> Result<(), EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::invalid_amount(
            "amount must be greater than zero",
        ));
    }
    if amount > MAX_OPERATION_AMOUNT {
        return Err(EngineError::invalid_amount(
            "amount exceeds the per-operation limit",
        ));
    }
    if amount.round_dp(2) != amount {
        return Err(EngineError::invalid_amount(
            "amount must have at most two decimal places",
        ));
    }
    Ok(())
}

/// Validate a caller-supplied operation key
///
/// Keys are opaque; only the length (1..=100 characters) is constrained.
pub fn validate_operation_key(operation_key: &str) -> Result<(), EngineError> {
    if operation_key.is_empty() {
        return Err(EngineError::invalid_operation_key(
            "operation key must not be empty",
        ));
    }
    if operation_key.len() > OPERATION_KEY_MAX_LEN {
        return Err(EngineError::invalid_operation_key(
            "operation key must be at most 100 characters",
        ));
    }
    Ok(())
}

/// Assert that `user_id` owns the account
pub fn ensure_owned(account: &Account, user_id: UserId) -> Result<(), EngineError> {
    if account.user_id != user_id {
        return Err(EngineError::UnauthorizedAccess);
    }
    Ok(())
}

/// Assert that the account is in the Active status
pub fn ensure_active(account: &Account) -> Result<(), EngineError> {
    match account.status {
        AccountStatus::Active => Ok(()),
        AccountStatus::Frozen => Err(EngineError::account_frozen(&account.account_number)),
        AccountStatus::Closed => Err(EngineError::account_closed(&account.account_number)),
    }
}

/// Assert that the account balance covers a debit of `amount`
pub fn ensure_sufficient_funds(account: &Account, amount: Decimal) -> Result<(), EngineError> {
    if account.balance < amount {
        return Err(EngineError::insufficient_funds(account.balance, amount));
    }
    Ok(())
}
