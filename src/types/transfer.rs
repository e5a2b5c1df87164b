//! Transfer record types
//!
//! A transfer pairs a debit leg on the source account with a credit leg on
//! the destination account. The transfer row identifies the pair; the two
//! journal entries reference it by ID.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;

/// Stable internal identifier of a transfer
pub type TransferId = Uuid;

/// Transfer lifecycle status
///
/// In the current flow a transfer row is inserted directly as Completed,
/// within the same store transaction as its two journal entries; no
/// committed row ever bears Pending. The state exists to support future
/// two-phase flows. Failed is reserved for externally reported failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Attempt in progress (ephemeral within a single attempt)
    Pending,

    /// Both legs committed
    Completed,

    /// The transfer was reported failed by an external collaborator
    Failed,
}

/// The record pairing the two legs of a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Stable internal ID
    pub id: TransferId,

    /// Debited account
    pub source_account_id: AccountId,

    /// Credited account
    pub destination_account_id: AccountId,

    /// Unsigned amount moved from source to destination
    pub amount: Decimal,

    /// Currency, taken from the source account
    pub currency: String,

    /// Lifecycle status
    pub status: TransferStatus,

    /// Human-readable description
    pub description: String,

    /// Caller-supplied operation key, unique across all transfers
    pub operation_key: String,

    /// Failure reason, set only by external collaborators
    pub failure_reason: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,
}
