//! Success results returned by the banking engine
//!
//! Receipts are the values the engine hands back to callers and the values
//! the idempotency layer serializes; a replayed operation deserializes the
//! stored body and returns a receipt identical to the original.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::journal::{EntryId, EntryKind};
use super::transfer::{TransferId, TransferStatus};

/// Result of a committed deposit or withdrawal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// The journal entry that was written
    pub entry_id: EntryId,

    /// The affected account
    pub account_id: AccountId,

    /// The affected account's number
    pub account_number: String,

    /// Deposit or Withdrawal
    pub kind: EntryKind,

    /// The amount as submitted (always positive)
    pub amount: Decimal,

    /// The account balance after the operation committed
    pub balance: Decimal,

    /// The description that was journaled
    pub description: String,

    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

/// Result of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// The transfer row that pairs the two legs
    pub transfer_id: TransferId,

    /// Debited account number
    pub source_account_number: String,

    /// Credited account number
    pub destination_account_number: String,

    /// The amount moved
    pub amount: Decimal,

    /// Currency of the transfer (the source account's currency)
    pub currency: String,

    /// Source account balance after the transfer committed
    pub source_balance: Decimal,

    /// Always Completed for engine-produced receipts
    pub status: TransferStatus,

    /// When the transfer row was created
    pub created_at: DateTime<Utc>,

    /// When the transfer completed (equal to `created_at` in the current flow)
    pub completed_at: DateTime<Utc>,
}
