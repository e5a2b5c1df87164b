//! In-memory store implementation
//!
//! Backs tests and the CLI with the same transactional contract a
//! relational store would provide. Tables are `DashMap`s for fine-grained
//! concurrent reads; writes are staged inside [`MemoryTransaction`] and
//! applied under a single commit mutex, where every version precondition
//! and uniqueness constraint is re-checked. A transaction that fails its
//! checks leaves no trace.
//!
//! # Thread safety
//!
//! `MemoryStore` is cheap to clone (the clone shares the tables through an
//! `Arc`) and safe to share across threads. Concurrent readers never block
//! each other; committers serialize on the commit mutex, which is what
//! gives the version check its compare-and-swap meaning.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::types::{
    Account, AccountId, AccountStatus, AccountType, EntryId, EntryStatus, IdempotencyRecord,
    JournalEntry, KycStatus, Transfer, TransferId, UserId, UserProfile,
};

use super::{LedgerStats, Store, StoreError, StoreTransaction};

/// The shared table set behind a `MemoryStore`
#[derive(Debug, Default)]
struct Tables {
    accounts: DashMap<AccountId, Account>,
    account_numbers: DashMap<String, AccountId>,
    entries: DashMap<EntryId, JournalEntry>,
    transfers: DashMap<TransferId, Transfer>,
    transfer_keys: DashMap<String, TransferId>,
    idempotency: DashMap<(String, UserId), IdempotencyRecord>,
    users: DashMap<UserId, UserProfile>,
    national_ids: DashMap<String, UserId>,
    commit_lock: Mutex<()>,
}

/// In-memory transactional store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user
    ///
    /// Registration is owned by the surrounding system; this exists so
    /// tests and the CLI can seed the directory the bulk processor
    /// resolves against.
    pub fn create_user(
        &self,
        national_id: &str,
        full_name: &str,
        kyc_status: KycStatus,
    ) -> Result<UserProfile, StoreError> {
        if self.tables.national_ids.contains_key(national_id) {
            return Err(StoreError::backend(format!(
                "national id '{national_id}' already registered"
            )));
        }
        let profile = UserProfile::new(national_id, full_name, kyc_status);
        self.tables
            .national_ids
            .insert(profile.national_id.clone(), profile.id);
        self.tables.users.insert(profile.id, profile.clone());
        Ok(profile)
    }

    /// Open an account for a user
    ///
    /// Regenerates the account number until it is unique; collisions on
    /// six hex characters within one day are possible, just rare.
    pub fn create_account(
        &self,
        user_id: UserId,
        account_type: AccountType,
        currency: &str,
    ) -> Result<Account, StoreError> {
        loop {
            let account = Account::new(user_id, account_type, currency);
            if self
                .tables
                .account_numbers
                .contains_key(&account.account_number)
            {
                continue;
            }
            self.tables
                .account_numbers
                .insert(account.account_number.clone(), account.id);
            self.tables.accounts.insert(account.id, account.clone());
            return Ok(account);
        }
    }

    /// Change an account's status on behalf of an external collaborator
    ///
    /// Status transitions are not engine operations, but they still count
    /// as row mutations, so the version advances.
    pub fn set_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<(), StoreError> {
        let _guard = lock_commit(&self.tables);
        let mut account = self
            .tables
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::backend("account does not exist"))?;
        account.status = status;
        account.version += 1;
        Ok(())
    }

    /// All journal entries for an account, in no particular order
    pub fn entries_for_account(&self, account_id: AccountId) -> Vec<JournalEntry> {
        self.tables
            .entries
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All journal entries linked to a transfer
    pub fn entries_for_transfer(&self, transfer_id: TransferId) -> Vec<JournalEntry> {
        self.tables
            .entries
            .iter()
            .filter(|entry| entry.value().transfer_id == Some(transfer_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Find a journal entry by ID
    pub fn entry(&self, entry_id: EntryId) -> Option<JournalEntry> {
        self.tables
            .entries
            .get(&entry_id)
            .map(|entry| entry.value().clone())
    }

    /// Total number of journal entries across all accounts
    pub fn entry_count(&self) -> usize {
        self.tables.entries.len()
    }

    /// Overwrite a cached balance without touching the journal.
    ///
    /// Deliberately breaks the balance identity so reconciliation
    /// mismatches can be exercised.
    #[cfg(test)]
    pub(crate) fn force_balance(&self, account_id: AccountId, balance: Decimal) {
        if let Some(mut account) = self.tables.accounts.get_mut(&account_id) {
            account.balance = balance;
            account.version += 1;
        }
    }
}

/// Acquire the commit mutex, recovering from poisoning
///
/// A panicking committer cannot leave partial state behind (writes are
/// applied only after all checks pass), so continuing past a poisoned
/// lock is sound.
fn lock_commit(tables: &Tables) -> std::sync::MutexGuard<'_, ()> {
    match tables.commit_lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            staged_entries: Vec::new(),
            staged_transfers: Vec::new(),
            staged_accounts: Vec::new(),
        })
    }

    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables
            .accounts
            .get(&account_id)
            .map(|account| account.value().clone()))
    }

    fn account_by_number(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self
            .tables
            .account_numbers
            .get(account_number)
            .map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        self.account(id)
    }

    fn transfer_by_operation_key(
        &self,
        operation_key: &str,
    ) -> Result<Option<Transfer>, StoreError> {
        let Some(id) = self
            .tables
            .transfer_keys
            .get(operation_key)
            .map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        Ok(self
            .tables
            .transfers
            .get(&id)
            .map(|transfer| transfer.value().clone()))
    }

    fn idempotency_record(
        &self,
        operation_key: &str,
        user_id: UserId,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self
            .tables
            .idempotency
            .get(&(operation_key.to_string(), user_id))
            .map(|record| record.value().clone()))
    }

    fn upsert_idempotency_record(&self, mut record: IdempotencyRecord) -> Result<(), StoreError> {
        let key = (record.operation_key.clone(), record.user_id);
        if let Some(existing) = self.tables.idempotency.get(&key) {
            record.created_at = existing.value().created_at;
        }
        self.tables.idempotency.insert(key, record);
        Ok(())
    }

    fn remove_idempotency_record(
        &self,
        operation_key: &str,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        self.tables
            .idempotency
            .remove(&(operation_key.to_string(), user_id));
        Ok(())
    }

    fn completed_entry_stats(&self, account_id: AccountId) -> Result<LedgerStats, StoreError> {
        let mut ledger_balance = Decimal::ZERO;
        let mut entry_count = 0u64;
        for entry in self.tables.entries.iter() {
            let entry = entry.value();
            if entry.account_id == account_id && entry.status == EntryStatus::Completed {
                ledger_balance += entry.amount;
                entry_count += 1;
            }
        }
        Ok(LedgerStats {
            ledger_balance,
            entry_count,
        })
    }

    fn user_by_national_id(&self, national_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let Some(id) = self
            .tables
            .national_ids
            .get(national_id)
            .map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        Ok(self
            .tables
            .users
            .get(&id)
            .map(|user| user.value().clone()))
    }

    fn active_checking_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables
            .accounts
            .iter()
            .find(|account| {
                let account = account.value();
                account.user_id == user_id
                    && account.account_type == AccountType::Checking
                    && account.status == AccountStatus::Active
            })
            .map(|account| account.value().clone()))
    }
}

/// A transaction over a [`MemoryStore`]
///
/// Reads observe committed state; writes are staged locally. The version
/// precondition of each staged account update is checked eagerly at
/// staging time (fast failure) and re-checked at commit under the commit
/// mutex (correctness).
#[derive(Debug)]
pub struct MemoryTransaction {
    tables: Arc<Tables>,
    staged_entries: Vec<JournalEntry>,
    staged_transfers: Vec<Transfer>,
    staged_accounts: Vec<(Account, u64)>,
}

impl StoreTransaction for MemoryTransaction {
    fn account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables
            .accounts
            .get(&account_id)
            .map(|account| account.value().clone()))
    }

    fn account_by_number(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self
            .tables
            .account_numbers
            .get(account_number)
            .map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        self.account(id)
    }

    fn insert_entry(&mut self, entry: JournalEntry) -> Result<(), StoreError> {
        self.staged_entries.push(entry);
        Ok(())
    }

    fn insert_transfer(&mut self, transfer: Transfer) -> Result<(), StoreError> {
        if self
            .tables
            .transfer_keys
            .contains_key(&transfer.operation_key)
        {
            return Err(StoreError::DuplicateTransferKey {
                operation_key: transfer.operation_key,
            });
        }
        self.staged_transfers.push(transfer);
        Ok(())
    }

    fn update_account(
        &mut self,
        account: Account,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        match self.tables.accounts.get(&account.id) {
            Some(current) if current.value().version == expected_version => {}
            Some(_) => {
                return Err(StoreError::VersionConflict {
                    account_id: account.id,
                })
            }
            None => return Err(StoreError::backend("account does not exist")),
        }
        self.staged_accounts.push((account, expected_version));
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let MemoryTransaction {
            tables,
            staged_entries,
            staged_transfers,
            staged_accounts,
        } = self;

        let _guard = lock_commit(&tables);

        // Re-check every precondition before the first write becomes
        // visible: either the whole transaction lands or none of it.
        for (account, expected_version) in &staged_accounts {
            let current = tables
                .accounts
                .get(&account.id)
                .ok_or_else(|| StoreError::backend("account does not exist"))?;
            if current.value().version != *expected_version {
                return Err(StoreError::VersionConflict {
                    account_id: account.id,
                });
            }
        }
        for transfer in &staged_transfers {
            if tables.transfer_keys.contains_key(&transfer.operation_key) {
                return Err(StoreError::DuplicateTransferKey {
                    operation_key: transfer.operation_key.clone(),
                });
            }
        }

        for entry in staged_entries {
            tables.entries.insert(entry.id, entry);
        }
        for transfer in staged_transfers {
            tables
                .transfer_keys
                .insert(transfer.operation_key.clone(), transfer.id);
            tables.transfers.insert(transfer.id, transfer);
        }
        for (mut account, expected_version) in staged_accounts {
            account.version = expected_version + 1;
            tables.accounts.insert(account.id, account);
        }

        Ok(())
    }

    fn rollback(self) {
        // Staged writes are dropped with the transaction.
    }
}
