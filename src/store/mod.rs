//! Store abstraction: the transactional persistence seam
//!
//! The engine depends on a narrow trait pair instead of a concrete
//! database so an in-memory implementation can back tests and the CLI.
//! [`Store`] opens transactions and serves read-only queries;
//! [`StoreTransaction`] stages writes that commit or roll back as a unit.
//!
//! # Compare-and-swap contract
//!
//! [`StoreTransaction::update_account`] takes the new account state and the
//! version the caller read. The store MUST provide compare-and-swap
//! semantics directly: the write succeeds and advances the version only if
//! the row's current version still equals the expected value, otherwise it
//! signals [`StoreError::VersionConflict`] and nothing becomes visible.
//! A read-then-write emulation is not an acceptable implementation.
//!
//! # Failure semantics
//!
//! Version conflicts are recoverable (the engine retries with fresh
//! reads). Uniqueness violations surface as their dedicated variants so
//! the engine can translate them (a duplicate transfer key is a duplicate
//! operation, not a storage fault). Everything else is a backend error
//! that aborts the operation.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{
    Account, AccountId, EngineError, IdempotencyRecord, JournalEntry, Transfer, UserId,
    UserProfile,
};

pub mod memory;

pub use memory::{MemoryStore, MemoryTransaction};

/// Errors surfaced by a store implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The version check on an account update failed
    ///
    /// Recoverable: the caller should discard its reads and retry.
    #[error("version conflict on account {account_id}")]
    VersionConflict {
        /// The contended account
        account_id: AccountId,
    },

    /// An account number collided with an existing one
    #[error("account number '{account_number}' already exists")]
    DuplicateAccountNumber {
        /// The colliding number
        account_number: String,
    },

    /// A transfer operation key collided with an existing one
    #[error("transfer operation key '{operation_key}' already exists")]
    DuplicateTransferKey {
        /// The colliding key
        operation_key: String,
    },

    /// Any other backend failure
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the failure
        message: String,
    },
}

impl StoreError {
    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            // The unique constraint on transfer keys is the second line of
            // defense against concurrent duplicates (the idempotency layer
            // is the first); it is a duplicate submission, not a fault.
            StoreError::DuplicateTransferKey { operation_key } => {
                EngineError::DuplicateOperation { operation_key }
            }
            other => EngineError::Storage {
                message: other.to_string(),
            },
        }
    }
}

/// Ledger-derived aggregate over an account's Completed journal entries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerStats {
    /// Sum of Completed entry amounts
    pub ledger_balance: Decimal,

    /// Number of Completed entries
    pub entry_count: u64,
}

/// A store transaction: staged writes that commit or roll back as a unit
///
/// Reads within a transaction observe committed state. All writes are
/// invisible to other transactions until [`commit`](Self::commit) returns
/// `Ok`; a failed commit leaves no partial state behind.
pub trait StoreTransaction {
    /// Find an account by internal ID
    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Find an account by account number
    fn account_by_number(&self, account_number: &str) -> Result<Option<Account>, StoreError>;

    /// Stage a journal entry insert
    fn insert_entry(&mut self, entry: JournalEntry) -> Result<(), StoreError>;

    /// Stage a transfer record insert
    ///
    /// Fails with [`StoreError::DuplicateTransferKey`] if the operation key
    /// is already taken (checked again at commit).
    fn insert_transfer(&mut self, transfer: Transfer) -> Result<(), StoreError>;

    /// Stage an account update conditional on its version
    ///
    /// `account` carries the new state; `expected_version` is the version
    /// the caller read. On commit the store advances the row to
    /// `expected_version + 1`, or fails the whole transaction with
    /// [`StoreError::VersionConflict`] if the row moved underneath.
    fn update_account(&mut self, account: Account, expected_version: u64)
        -> Result<(), StoreError>;

    /// Atomically apply all staged writes
    fn commit(self) -> Result<(), StoreError>;

    /// Discard all staged writes
    fn rollback(self);
}

/// The persistence interface the engine requires
pub trait Store: Send + Sync {
    /// The transaction type this store hands out
    type Tx: StoreTransaction;

    /// Begin a transaction
    fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Find an account by internal ID (read-only, no transaction)
    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Find an account by account number (read-only, no transaction)
    fn account_by_number(&self, account_number: &str) -> Result<Option<Account>, StoreError>;

    /// Find a transfer by its operation key
    fn transfer_by_operation_key(
        &self,
        operation_key: &str,
    ) -> Result<Option<Transfer>, StoreError>;

    /// Find an idempotency record by `(operation key, user)`
    fn idempotency_record(
        &self,
        operation_key: &str,
        user_id: UserId,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Insert or update an idempotency record
    fn upsert_idempotency_record(&self, record: IdempotencyRecord) -> Result<(), StoreError>;

    /// Delete an idempotency record, if present
    fn remove_idempotency_record(
        &self,
        operation_key: &str,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    /// Sum and count the Completed journal entries of an account
    fn completed_entry_stats(&self, account_id: AccountId) -> Result<LedgerStats, StoreError>;

    /// Resolve a user by national ID
    fn user_by_national_id(&self, national_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Find a user's active checking account, if they have one
    fn active_checking_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError>;
}
