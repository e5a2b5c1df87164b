//! Journal entry types: the atomic accounting records of the ledger
//!
//! Every movement of money is recorded as a signed journal entry against a
//! single account. Entries with status Completed are append-only: once
//! committed they are never updated or deleted. Reversals are expressed by
//! emitting a compensating entry, never by mutating history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::transfer::TransferId;

/// Stable internal identifier of a journal entry
pub type EntryId = Uuid;

/// What kind of movement a journal entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Cash credited to an account
    Deposit,

    /// Cash debited from an account
    Withdrawal,

    /// The debit leg of a transfer (always negative, always linked)
    TransferDebit,

    /// The credit leg of a transfer (always positive, always linked)
    TransferCredit,
}

/// Journal entry lifecycle status
///
/// The engine only ever writes Completed entries. Failed and Reversed are
/// reserved for externally reported outcomes and compensations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// The entry contributes to the account balance
    Completed,

    /// The movement did not take effect
    Failed,

    /// The movement was compensated by a later entry
    Reversed,
}

/// One signed contribution to one account's balance at a point in time
///
/// The `amount` sign convention is: positive = credit to the account,
/// negative = debit. `balance_after` is the account's running balance
/// immediately after this entry, so for any account the k-th Completed
/// entry's `balance_after` equals the sum of the first k amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Stable internal ID
    pub id: EntryId,

    /// The account this entry applies to
    pub account_id: AccountId,

    /// Signed amount (positive = credit, negative = debit)
    pub amount: Decimal,

    /// Movement kind
    pub kind: EntryKind,

    /// Lifecycle status
    pub status: EntryStatus,

    /// The account's running balance immediately after this entry
    pub balance_after: Decimal,

    /// Linked transfer, present iff `kind` is a transfer leg
    pub transfer_id: Option<TransferId>,

    /// Human-readable description
    pub description: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
