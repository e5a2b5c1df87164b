//! Balance reconciliation
//!
//! The cached per-account balance is a denormalized aggregate of the
//! journal. The reconciler recomputes the ledger-derived balance and
//! compares it against the cache. It never mutates; a discrepancy is
//! surfaced as a critical log event for the observability collaborator
//! and reported to the caller.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;

use crate::core::validator;
use crate::store::Store;
use crate::types::{AccountId, EngineError, UserId};

/// Result of reconciling one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// The reconciled account
    pub account_id: AccountId,

    /// The reconciled account's number
    pub account_number: String,

    /// The denormalized balance stored on the account row
    pub cached_balance: Decimal,

    /// The sum of the account's Completed journal entries
    pub ledger_balance: Decimal,

    /// How many Completed entries contributed to the ledger balance
    pub entry_count: u64,

    /// True iff `cached_balance == ledger_balance`
    pub reconciled: bool,
}

/// Read-only balance verifier
#[derive(Debug)]
pub struct Reconciler<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> Reconciler<'a, S> {
    /// Create a reconciler over `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Compare an account's cached balance against its ledger sum
    ///
    /// # Errors
    ///
    /// `ACCOUNT_NOT_FOUND` if the account does not exist,
    /// `UNAUTHORIZED_ACCESS` if `user_id` does not own it,
    /// `STORAGE_ERROR` on store failure.
    pub fn report(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<ReconcileReport, EngineError> {
        let account = self
            .store
            .account(account_id)?
            .ok_or(EngineError::AccountNotFound)?;
        validator::ensure_owned(&account, user_id)?;

        let stats = self.store.completed_entry_stats(account_id)?;
        let reconciled = stats.ledger_balance == account.balance;
        if !reconciled {
            error!(
                account = %account.account_number,
                cached = %account.balance,
                ledger = %stats.ledger_balance,
                "balance reconciliation mismatch"
            );
        }

        Ok(ReconcileReport {
            account_id,
            account_number: account.account_number,
            cached_balance: account.balance,
            ledger_balance: stats.ledger_balance,
            entry_count: stats.entry_count,
            reconciled,
        })
    }
}
