//! Core Banking Engine Library
//! # Overview
//!
//! This library implements the money-moving core of a small digital bank:
//! an append-only double-entry ledger as the source of truth, cached
//! per-account balances derived from it, and a single controlled code path
//! for every monetary mutation that provides atomicity, idempotency, and
//! optimistic concurrency control.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, JournalEntry, Transfer, etc.)
//! - [`store`] - The transactional persistence seam and the in-memory
//!   implementation used by tests and the CLI
//! - [`core`] - Business logic components:
//!   - [`core::validator`] - pure input and post-read checks
//!   - [`core::idempotency`] - deduplication of retried submissions
//!   - [`core::engine`] - the orchestrator that moves money
//!   - [`core::reconciler`] - cached-balance verification
//! - [`bulk`] - CSV bulk-instruction processing (sync and streaming)
//! - [`cli`] - CLI argument parsing
//!
//! # Operations
//!
//! The engine exposes five operation calls:
//!
//! - **Deposit**: credit funds to an owned, active account
//! - **Withdraw**: debit funds, never below a zero balance
//! - **Transfer**: atomically move funds between two accounts, with a
//!   required idempotency key and double-entry journaling
//! - **Reconcile**: verify a cached balance against the ledger sum
//! - **Bulk processing**: drive deposits/withdrawals from a CSV file,
//!   isolating per-row failures
//!
//! # Concurrency
//!
//! Account rows carry a monotonic version counter. Writers never hold
//! locks across reads; each operation reads, computes, and commits
//! conditionally on the versions it read, retrying up to three times with
//! exponential backoff on conflict. A reader either sees both legs of a
//! transfer or neither.

// Module declarations
pub mod bulk;
pub mod cli;
pub mod core;
pub mod store;
pub mod types;

pub use crate::core::{
    Admission, BankingEngine, EngineConfig, IdempotencyGate, ReconcileReport, Reconciler,
};
pub use bulk::{
    write_summary_csv, BulkOperation, BulkProcessor, BulkSummary, RowResult,
    StreamingBulkProcessor,
};
pub use store::{LedgerStats, MemoryStore, Store, StoreError, StoreTransaction};
pub use types::{
    Account, AccountId, AccountStatus, AccountType, EngineError, EntryKind, EntryStatus,
    IdempotencyRecord, JournalEntry, KycStatus, TransactionReceipt, Transfer, TransferReceipt,
    TransferStatus, UserId, UserProfile,
};
