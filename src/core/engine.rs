//! The banking engine: the single code path that moves money
//!
//! `BankingEngine` is the only component that writes journal entries or
//! mutates account rows. Every operation follows the same template:
//!
//! 1. Cheap pre-transaction validation of the amount (and key, if any).
//! 2. Idempotency admission: a completed key replays the stored result,
//!    an in-flight key is rejected as a duplicate.
//! 3. A bounded optimistic retry loop. Each attempt opens one store
//!    transaction, reads the affected accounts with their versions,
//!    re-asserts the post-read validation, writes the journal entries
//!    (and transfer record), and updates every touched account with a
//!    version check. A version conflict aborts the attempt; after a
//!    backoff the next attempt starts from fresh reads.
//! 4. On commit, the result is recorded for replay (best-effort) and a
//!    structured log event is emitted.
//!
//! If the engine returns an error, no journal entry was committed for
//! that call.

use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::idempotency::{Admission, IdempotencyGate};
use crate::core::reconciler::{ReconcileReport, Reconciler};
use crate::core::validator;
use crate::store::{Store, StoreError, StoreTransaction};
use crate::types::{
    AccountId, EngineError, EntryKind, EntryStatus, JournalEntry, TransactionReceipt, Transfer,
    TransferReceipt, TransferStatus, UserId,
};

/// Operation path identifiers used to scope idempotency records
const DEPOSIT_PATH: &str = "deposit";
const WITHDRAW_PATH: &str = "withdraw";
const TRANSFER_PATH: &str = "transfer";

/// Tunable knobs of the engine
///
/// The defaults implement the documented policy: three total attempts
/// with 50/100/200 ms backoff between them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Total attempts per operation (first try included)
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each further retry
    pub backoff_base: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    /// The delay before the retry following attempt `attempt` (1-based)
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.pow(attempt.saturating_sub(1))
    }
}

/// Outcome of one optimistic attempt
enum Attempt<T> {
    /// The attempt committed
    Done(T),

    /// A version check failed; retry with fresh reads
    Conflict,
}

/// Error channel inside a single attempt
///
/// Version conflicts are recoverable within the retry loop; everything
/// else aborts the operation. The `From` impls let attempt bodies use `?`
/// on both store and validation errors.
enum AttemptError {
    Conflict,
    Fatal(EngineError),
}

impl From<EngineError> for AttemptError {
    fn from(error: EngineError) -> Self {
        AttemptError::Fatal(error)
    }
}

impl From<StoreError> for AttemptError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict { .. } => AttemptError::Conflict,
            other => AttemptError::Fatal(other.into()),
        }
    }
}

/// Cash movement direction for the shared deposit/withdraw path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movement {
    Deposit,
    Withdrawal,
}

impl Movement {
    fn entry_kind(self) -> EntryKind {
        match self {
            Movement::Deposit => EntryKind::Deposit,
            Movement::Withdrawal => EntryKind::Withdrawal,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Movement::Deposit => DEPOSIT_PATH,
            Movement::Withdrawal => WITHDRAW_PATH,
        }
    }

    fn default_description(self) -> &'static str {
        match self {
            Movement::Deposit => "Cash deposit",
            Movement::Withdrawal => "Cash withdrawal",
        }
    }
}

/// The stateless orchestrator over the store
///
/// The engine holds no mutable state of its own; everything mutable lives
/// in the store, so the engine can be shared freely across threads.
#[derive(Debug)]
pub struct BankingEngine<S: Store> {
    store: S,
    config: EngineConfig,
}

impl<S: Store> BankingEngine<S> {
    /// Create an engine with the default retry policy
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Create an engine with a custom configuration
    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Credit `amount` to the user's account
    ///
    /// The operation key is optional; without one no deduplication is
    /// performed. An empty description defaults to "Cash deposit".
    ///
    /// # Errors
    ///
    /// `INVALID_AMOUNT`, `ACCOUNT_NOT_FOUND`, `UNAUTHORIZED_ACCESS`,
    /// `ACCOUNT_FROZEN`, `ACCOUNT_CLOSED`, `DUPLICATE_OPERATION`,
    /// `CONCURRENCY_CONFLICT`, `STORAGE_ERROR`.
    pub fn deposit(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
        description: Option<&str>,
        operation_key: Option<&str>,
    ) -> Result<TransactionReceipt, EngineError> {
        self.movement(
            user_id,
            account_id,
            amount,
            Movement::Deposit,
            description,
            operation_key,
        )
    }

    /// Debit `amount` from the user's account
    ///
    /// Fails with `INSUFFICIENT_FUNDS` if the cached balance does not
    /// cover the amount; balances never go negative.
    pub fn withdraw(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
        description: Option<&str>,
        operation_key: Option<&str>,
    ) -> Result<TransactionReceipt, EngineError> {
        self.movement(
            user_id,
            account_id,
            amount,
            Movement::Withdrawal,
            description,
            operation_key,
        )
    }

    /// Move `amount` between two accounts, atomically
    ///
    /// The operation key is required. Within one store transaction the
    /// engine inserts a Completed transfer row, a TransferDebit entry on
    /// the source, a TransferCredit entry on the destination, and updates
    /// both accounts with version checks; all four writes commit together
    /// or not at all.
    ///
    /// Post-read validation order (first failure wins): both accounts
    /// exist, source differs from destination, the caller owns the
    /// source, both accounts are Active, the source has sufficient funds.
    pub fn transfer(
        &self,
        user_id: UserId,
        source_account_number: &str,
        destination_account_number: &str,
        amount: Decimal,
        description: Option<&str>,
        operation_key: &str,
    ) -> Result<TransferReceipt, EngineError> {
        validator::validate_amount(amount)?;
        validator::validate_operation_key(operation_key)?;

        let gate = IdempotencyGate::new(&self.store);
        match gate.admit(user_id, operation_key, TRANSFER_PATH)? {
            Admission::Replay(body) => return replay(&body),
            Admission::InFlight => return Err(EngineError::duplicate_operation(operation_key)),
            Admission::Proceed => {}
        }

        // The transfer table is consulted as well: if a transfer with
        // this key exists but its idempotency record was lost, the key is
        // still spent.
        if self.store.transfer_by_operation_key(operation_key)?.is_some() {
            gate.release(user_id, operation_key);
            return Err(EngineError::duplicate_operation(operation_key));
        }

        let description = normalized_description(description, "Fund transfer");
        let outcome = self.run_with_retry(|| {
            self.attempt_transfer(
                user_id,
                source_account_number,
                destination_account_number,
                amount,
                &description,
                operation_key,
            )
        });

        match outcome {
            Ok(receipt) => {
                self.record_result(user_id, Some(operation_key), TRANSFER_PATH, &receipt);
                info!(
                    operation = "transfer",
                    source = %receipt.source_account_number,
                    destination = %receipt.destination_account_number,
                    amount = %amount,
                    balance = %receipt.source_balance,
                    "transfer completed"
                );
                Ok(receipt)
            }
            Err(error) => {
                gate.release(user_id, operation_key);
                Err(error)
            }
        }
    }

    /// Verify that an account's cached balance matches its ledger sum
    pub fn reconcile(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<ReconcileReport, EngineError> {
        Reconciler::new(&self.store).report(user_id, account_id)
    }

    /// Shared deposit/withdraw path
    fn movement(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
        movement: Movement,
        description: Option<&str>,
        operation_key: Option<&str>,
    ) -> Result<TransactionReceipt, EngineError> {
        validator::validate_amount(amount)?;

        if let Some(key) = operation_key {
            validator::validate_operation_key(key)?;
            match IdempotencyGate::new(&self.store).admit(user_id, key, movement.path())? {
                Admission::Replay(body) => return replay(&body),
                Admission::InFlight => return Err(EngineError::duplicate_operation(key)),
                Admission::Proceed => {}
            }
        }

        let description = normalized_description(description, movement.default_description());
        let outcome = self.run_with_retry(|| {
            self.attempt_movement(user_id, account_id, amount, movement, &description)
        });

        match outcome {
            Ok(receipt) => {
                self.record_result(user_id, operation_key, movement.path(), &receipt);
                info!(
                    operation = movement.path(),
                    account = %receipt.account_number,
                    amount = %amount,
                    balance = %receipt.balance,
                    "operation completed"
                );
                Ok(receipt)
            }
            Err(error) => {
                if let Some(key) = operation_key {
                    IdempotencyGate::new(&self.store).release(user_id, key);
                }
                Err(error)
            }
        }
    }

    /// One optimistic attempt at a deposit or withdrawal
    fn attempt_movement(
        &self,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
        movement: Movement,
        description: &str,
    ) -> Result<Attempt<TransactionReceipt>, EngineError> {
        let mut tx = self.store.begin()?;
        let staged =
            match self.movement_in_tx(&mut tx, user_id, account_id, amount, movement, description)
            {
                Ok(receipt) => receipt,
                Err(AttemptError::Conflict) => {
                    tx.rollback();
                    return Ok(Attempt::Conflict);
                }
                Err(AttemptError::Fatal(error)) => {
                    tx.rollback();
                    return Err(error);
                }
            };
        finish_commit(tx, staged)
    }

    /// Stage a deposit or withdrawal inside an open transaction
    fn movement_in_tx(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
        movement: Movement,
        description: &str,
    ) -> Result<TransactionReceipt, AttemptError> {
        let account = tx.account(account_id)?.ok_or(EngineError::AccountNotFound)?;
        validator::ensure_owned(&account, user_id)?;
        validator::ensure_active(&account)?;

        let signed_amount = match movement {
            Movement::Deposit => amount,
            Movement::Withdrawal => {
                validator::ensure_sufficient_funds(&account, amount)?;
                -amount
            }
        };
        let balance_after = account.balance + signed_amount;

        let entry = JournalEntry {
            id: Uuid::new_v4(),
            account_id: account.id,
            amount: signed_amount,
            kind: movement.entry_kind(),
            status: EntryStatus::Completed,
            balance_after,
            transfer_id: None,
            description: description.to_string(),
            created_at: chrono::Utc::now(),
        };
        let receipt = TransactionReceipt {
            entry_id: entry.id,
            account_id: account.id,
            account_number: account.account_number.clone(),
            kind: entry.kind,
            amount,
            balance: balance_after,
            description: entry.description.clone(),
            created_at: entry.created_at,
        };
        tx.insert_entry(entry)?;

        let expected_version = account.version;
        let mut updated = account;
        updated.balance = balance_after;
        tx.update_account(updated, expected_version)?;

        Ok(receipt)
    }

    /// One optimistic attempt at a transfer
    fn attempt_transfer(
        &self,
        user_id: UserId,
        source_account_number: &str,
        destination_account_number: &str,
        amount: Decimal,
        description: &str,
        operation_key: &str,
    ) -> Result<Attempt<TransferReceipt>, EngineError> {
        let mut tx = self.store.begin()?;
        let staged = match self.transfer_in_tx(
            &mut tx,
            user_id,
            source_account_number,
            destination_account_number,
            amount,
            description,
            operation_key,
        ) {
            Ok(receipt) => receipt,
            Err(AttemptError::Conflict) => {
                tx.rollback();
                return Ok(Attempt::Conflict);
            }
            Err(AttemptError::Fatal(error)) => {
                tx.rollback();
                return Err(error);
            }
        };
        finish_commit(tx, staged)
    }

    /// Stage the four transfer writes inside an open transaction
    #[allow(clippy::too_many_arguments)]
    fn transfer_in_tx(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        source_account_number: &str,
        destination_account_number: &str,
        amount: Decimal,
        description: &str,
        operation_key: &str,
    ) -> Result<TransferReceipt, AttemptError> {
        let source = tx
            .account_by_number(source_account_number)?
            .ok_or(EngineError::AccountNotFound)?;
        let destination = tx
            .account_by_number(destination_account_number)?
            .ok_or(EngineError::AccountNotFound)?;

        if source.id == destination.id {
            return Err(EngineError::SelfTransfer.into());
        }
        validator::ensure_owned(&source, user_id)?;
        validator::ensure_active(&source)?;
        validator::ensure_active(&destination)?;
        validator::ensure_sufficient_funds(&source, amount)?;

        let now = chrono::Utc::now();
        let transfer = Transfer {
            id: Uuid::new_v4(),
            source_account_id: source.id,
            destination_account_id: destination.id,
            amount,
            currency: source.currency.clone(),
            status: TransferStatus::Completed,
            description: description.to_string(),
            operation_key: operation_key.to_string(),
            failure_reason: None,
            created_at: now,
            completed_at: Some(now),
        };
        let receipt = TransferReceipt {
            transfer_id: transfer.id,
            source_account_number: source.account_number.clone(),
            destination_account_number: destination.account_number.clone(),
            amount,
            currency: transfer.currency.clone(),
            source_balance: source.balance - amount,
            status: TransferStatus::Completed,
            created_at: now,
            completed_at: now,
        };
        tx.insert_transfer(transfer.clone())?;

        let source_after = source.balance - amount;
        let destination_after = destination.balance + amount;

        tx.insert_entry(JournalEntry {
            id: Uuid::new_v4(),
            account_id: source.id,
            amount: -amount,
            kind: EntryKind::TransferDebit,
            status: EntryStatus::Completed,
            balance_after: source_after,
            transfer_id: Some(transfer.id),
            description: format!("Transfer to {}", destination.account_number),
            created_at: now,
        })?;
        tx.insert_entry(JournalEntry {
            id: Uuid::new_v4(),
            account_id: destination.id,
            amount,
            kind: EntryKind::TransferCredit,
            status: EntryStatus::Completed,
            balance_after: destination_after,
            transfer_id: Some(transfer.id),
            description: format!("Transfer from {}", source.account_number),
            created_at: now,
        })?;

        let source_version = source.version;
        let mut source_updated = source;
        source_updated.balance = source_after;
        tx.update_account(source_updated, source_version)?;

        let destination_version = destination.version;
        let mut destination_updated = destination;
        destination_updated.balance = destination_after;
        tx.update_account(destination_updated, destination_version)?;

        Ok(receipt)
    }

    /// Run an attempt closure under the bounded retry policy
    ///
    /// Between attempts the engine holds no state from the prior attempt;
    /// the closure re-reads everything. After the budget is exhausted the
    /// operation surfaces `CONCURRENCY_CONFLICT` with no side effects.
    fn run_with_retry<T>(
        &self,
        mut attempt_fn: impl FnMut() -> Result<Attempt<T>, EngineError>,
    ) -> Result<T, EngineError> {
        for attempt in 1..=self.config.max_attempts {
            match attempt_fn()? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Conflict => {
                    if attempt < self.config.max_attempts {
                        let delay = self.config.backoff_delay(attempt);
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "version conflict, retrying with fresh reads"
                        );
                        thread::sleep(delay);
                    }
                }
            }
        }
        Err(EngineError::ConcurrencyConflict {
            attempts: self.config.max_attempts,
        })
    }

    /// Record a committed result for replay (best-effort)
    ///
    /// A failure to record does not fail the operation; it only weakens
    /// replay semantics for this key.
    fn record_result<T: Serialize>(
        &self,
        user_id: UserId,
        operation_key: Option<&str>,
        path: &str,
        receipt: &T,
    ) {
        let Some(key) = operation_key else {
            return;
        };
        match serde_json::to_string(receipt) {
            Ok(body) => {
                if let Err(error) =
                    IdempotencyGate::new(&self.store).record(user_id, key, path, body)
                {
                    warn!(%error, operation_key = key, "failed to record idempotency result");
                }
            }
            Err(error) => {
                warn!(%error, operation_key = key, "failed to serialize idempotency result");
            }
        }
    }
}

/// Commit a staged attempt, classifying a commit-time version conflict
/// as retryable
fn finish_commit<Tx: StoreTransaction, T>(tx: Tx, staged: T) -> Result<Attempt<T>, EngineError> {
    match tx.commit() {
        Ok(()) => Ok(Attempt::Done(staged)),
        Err(error) => match AttemptError::from(error) {
            AttemptError::Conflict => Ok(Attempt::Conflict),
            AttemptError::Fatal(error) => Err(error),
        },
    }
}

/// Replace an empty or missing description with the operation default
fn normalized_description(description: Option<&str>, default: &str) -> String {
    match description {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => default.to_string(),
    }
}

/// Decode a stored response body back into a receipt
fn replay<T: DeserializeOwned>(body: &str) -> Result<T, EngineError> {
    serde_json::from_str(body)
        .map_err(|_| EngineError::storage("stored idempotency response could not be decoded"))
}
