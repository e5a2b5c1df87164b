//! End-to-end integration tests
//!
//! These tests drive the public engine surface against the in-memory
//! store and check the system-wide guarantees:
//! - the concrete deposit/withdraw/transfer/reconcile scenarios
//! - ledger invariants (balance identity, conservation, double entry,
//!   monotone versions, journal immutability)
//! - idempotent replay
//! - behavior under parallel writers (threads sharing one engine)
//! - the bulk processing pipeline, sync and streaming

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use bank_core::{
    Account, AccountType, BankingEngine, BulkProcessor, EngineError, EntryKind, KycStatus,
    MemoryStore, Store, StreamingBulkProcessor, TransferStatus, UserProfile,
};

/// Create a store with an engine and one verified user with a checking
/// account
fn setup() -> (
    MemoryStore,
    Arc<BankingEngine<MemoryStore>>,
    UserProfile,
    Account,
) {
    let store = MemoryStore::new();
    let user = store
        .create_user("1000000001", "Alex Rivera", KycStatus::Verified)
        .unwrap();
    let account = store
        .create_account(user.id, AccountType::Checking, "USD")
        .unwrap();
    let engine = Arc::new(BankingEngine::new(store.clone()));
    (store, engine, user, account)
}

/// Add another verified user with a checking account
fn add_user(store: &MemoryStore, national_id: &str) -> (UserProfile, Account) {
    let user = store
        .create_user(national_id, "Extra User", KycStatus::Verified)
        .unwrap();
    let account = store
        .create_account(user.id, AccountType::Checking, "USD")
        .unwrap();
    (user, account)
}

#[test]
fn test_simple_deposit_scenario() {
    let (store, engine, user, account) = setup();

    let receipt = engine
        .deposit(user.id, account.id, dec!(100.00), Some("test"), None)
        .unwrap();
    assert_eq!(receipt.balance, dec!(100.00));

    let entries = store.entries_for_account(account.id);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Deposit);
    assert_eq!(entries[0].amount, dec!(100.00));
    assert_eq!(entries[0].balance_after, dec!(100.00));

    assert_eq!(
        store.account(account.id).unwrap().unwrap().balance,
        dec!(100.00)
    );

    let report = engine.reconcile(user.id, account.id).unwrap();
    assert!(report.reconciled);
}

#[test]
fn test_insufficient_withdrawal_scenario() {
    let (store, engine, user, account) = setup();
    engine
        .deposit(user.id, account.id, dec!(50.00), None, None)
        .unwrap();

    let result = engine.withdraw(user.id, account.id, dec!(100.00), None, None);
    assert_eq!(result.unwrap_err().code(), "INSUFFICIENT_FUNDS");

    // Balance unchanged, no new journal entry.
    assert_eq!(
        store.account(account.id).unwrap().unwrap().balance,
        dec!(50.00)
    );
    assert_eq!(store.entries_for_account(account.id).len(), 1);
}

#[test]
fn test_transfer_atomicity_scenario() {
    let (store, engine, user, source) = setup();
    let (_, destination) = add_user(&store, "1000000002");

    engine
        .deposit(user.id, source.id, dec!(500.00), None, None)
        .unwrap();
    let other_engine = BankingEngine::new(store.clone());
    other_engine
        .deposit(
            destination.user_id,
            destination.id,
            dec!(200.00),
            None,
            None,
        )
        .unwrap();

    let receipt = engine
        .transfer(
            user.id,
            &source.account_number,
            &destination.account_number,
            dec!(150.00),
            None,
            "k1",
        )
        .unwrap();

    assert_eq!(receipt.status, TransferStatus::Completed);

    let source_balance = store.account(source.id).unwrap().unwrap().balance;
    let destination_balance = store.account(destination.id).unwrap().unwrap().balance;
    assert_eq!(source_balance, dec!(350.00));
    assert_eq!(destination_balance, dec!(350.00));
    // Conservation: the transfer moved money, it did not create any.
    assert_eq!(source_balance + destination_balance, dec!(700.00));

    let legs = store.entries_for_transfer(receipt.transfer_id);
    assert_eq!(legs.len(), 2);
    let amounts: Vec<Decimal> = legs.iter().map(|entry| entry.amount).collect();
    assert!(amounts.contains(&dec!(-150.00)));
    assert!(amounts.contains(&dec!(150.00)));
}

#[test]
fn test_transfer_idempotency_scenario() {
    let (store, engine, user, source) = setup();
    let (_, destination) = add_user(&store, "1000000003");
    engine
        .deposit(user.id, source.id, dec!(500.00), None, None)
        .unwrap();

    let first = engine
        .transfer(
            user.id,
            &source.account_number,
            &destination.account_number,
            dec!(200.00),
            None,
            "k2",
        )
        .unwrap();
    let second = engine
        .transfer(
            user.id,
            &source.account_number,
            &destination.account_number,
            dec!(200.00),
            None,
            "k2",
        )
        .unwrap();

    // The replay is byte-identical to the original result.
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    // The source was debited exactly once.
    assert_eq!(
        store.account(source.id).unwrap().unwrap().balance,
        dec!(300.00)
    );
    // Only two journal entries exist for that key's transfer.
    assert_eq!(store.entries_for_transfer(first.transfer_id).len(), 2);
}

#[test]
fn test_reconciliation_after_mixed_operations() {
    let (store, engine, user, account) = setup();

    engine
        .deposit(user.id, account.id, dec!(1000), None, None)
        .unwrap();
    engine
        .withdraw(user.id, account.id, dec!(250), None, None)
        .unwrap();
    engine
        .deposit(user.id, account.id, dec!(75.50), None, None)
        .unwrap();

    assert_eq!(
        store.account(account.id).unwrap().unwrap().balance,
        dec!(825.50)
    );

    let report = engine.reconcile(user.id, account.id).unwrap();
    assert!(report.reconciled);
    assert_eq!(report.cached_balance, dec!(825.50));
    assert_eq!(report.ledger_balance, dec!(825.50));
    assert_eq!(report.entry_count, 3);
}

#[test]
fn test_two_parallel_transfers_from_one_account() {
    let (store, engine, user, source) = setup();
    let (_, first_dest) = add_user(&store, "1000000004");
    let (_, second_dest) = add_user(&store, "1000000005");
    engine
        .deposit(user.id, source.id, dec!(1000), None, None)
        .unwrap();

    let mut handles = vec![];
    for (destination, key) in [
        (first_dest.account_number.clone(), "kx"),
        (second_dest.account_number.clone(), "ky"),
    ] {
        let engine = Arc::clone(&engine);
        let source_number = source.account_number.clone();
        let user_id = user.id;
        handles.push(thread::spawn(move || {
            engine.transfer(user_id, &source_number, &destination, dec!(400), None, key)
        }));
    }

    for handle in handles {
        // Both transfers succeed, possibly after retries.
        handle.join().unwrap().unwrap();
    }

    let a = store.account(source.id).unwrap().unwrap().balance;
    let b = store.account(first_dest.id).unwrap().unwrap().balance;
    let c = store.account(second_dest.id).unwrap().unwrap().balance;
    assert_eq!(a, dec!(200));
    assert_eq!(b, dec!(400));
    assert_eq!(c, dec!(400));
    assert_eq!(a + b + c, dec!(1000));

    // Two transfer rows, four linked journal entries.
    let source_entries = store.entries_for_account(source.id);
    let debit_count = source_entries
        .iter()
        .filter(|entry| entry.kind == EntryKind::TransferDebit)
        .count();
    assert_eq!(debit_count, 2);
}

#[test]
fn test_parallel_deposits_to_one_account() {
    let (store, engine, user, account) = setup();

    let threads = 8;
    let mut handles = vec![];
    for _ in 0..threads {
        let engine = Arc::clone(&engine);
        let user_id = user.id;
        let account_id = account.id;
        handles.push(thread::spawn(move || {
            engine.deposit(user_id, account_id, dec!(10.00), None, None)
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Exactly N deposits landed, regardless of retry rounds.
    let stored = store.account(account.id).unwrap().unwrap();
    assert_eq!(stored.balance, dec!(80.00));
    let entries = store.entries_for_account(account.id);
    assert_eq!(entries.len(), threads);
    assert!(entries.iter().all(|entry| entry.kind == EntryKind::Deposit));

    let report = engine.reconcile(user.id, account.id).unwrap();
    assert!(report.reconciled);
}

#[test]
fn test_versions_advance_monotonically() {
    let (store, engine, user, account) = setup();

    let mut last_version = store.account(account.id).unwrap().unwrap().version;
    for _ in 0..4 {
        engine
            .deposit(user.id, account.id, dec!(5), None, None)
            .unwrap();
        let version = store.account(account.id).unwrap().unwrap().version;
        assert!(version > last_version);
        last_version = version;
    }
}

#[test]
fn test_journal_entries_are_immutable() {
    let (store, engine, user, account) = setup();

    let receipt = engine
        .deposit(user.id, account.id, dec!(42.00), None, None)
        .unwrap();
    let snapshot = store.entry(receipt.entry_id).unwrap();

    // Later operations leave the observed entry bit-identical.
    engine
        .deposit(user.id, account.id, dec!(1), None, None)
        .unwrap();
    engine
        .withdraw(user.id, account.id, dec!(2), None, None)
        .unwrap();

    let later = store.entry(receipt.entry_id).unwrap();
    assert_eq!(snapshot, later);
    assert_eq!(
        serde_json::to_string(&snapshot).unwrap(),
        serde_json::to_string(&later).unwrap()
    );
}

#[test]
fn test_deposit_replay_is_byte_identical() {
    let (store, engine, user, account) = setup();

    let first = engine
        .deposit(user.id, account.id, dec!(25.00), Some("salary"), Some("r-1"))
        .unwrap();
    let ledger_before = store.entries_for_account(account.id).len();

    let second = engine
        .deposit(user.id, account.id, dec!(25.00), Some("salary"), Some("r-1"))
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    // The ledger is unchanged between the two calls.
    assert_eq!(store.entries_for_account(account.id).len(), ledger_before);
}

#[rstest]
#[case::zero(dec!(0))]
#[case::negative(dec!(-10))]
#[case::sub_cent(dec!(1.999))]
#[case::over_limit(dec!(1_000_000_000.01))]
fn test_boundary_amounts_rejected(#[case] amount: Decimal) {
    let (_, engine, user, account) = setup();

    let result = engine.deposit(user.id, account.id, amount, None, None);
    assert_eq!(result.unwrap_err().code(), "INVALID_AMOUNT");

    let result = engine.withdraw(user.id, account.id, amount, None, None);
    assert_eq!(result.unwrap_err().code(), "INVALID_AMOUNT");
}

#[test]
fn test_self_transfer_rejected() {
    let (_, engine, user, account) = setup();

    let result = engine.transfer(
        user.id,
        &account.account_number,
        &account.account_number,
        dec!(10),
        None,
        "self-1",
    );
    assert_eq!(result.unwrap_err(), EngineError::SelfTransfer);
}

#[test]
fn test_transfer_from_foreign_account_rejected() {
    let (store, engine, _, source) = setup();
    let (other, destination) = add_user(&store, "1000000006");

    // `other` does not own `source`.
    let result = engine.transfer(
        other.id,
        &source.account_number,
        &destination.account_number,
        dec!(10),
        None,
        "f-1",
    );
    assert_eq!(result.unwrap_err(), EngineError::UnauthorizedAccess);
}

#[test]
fn test_conservation_across_mixed_operations() {
    let (store, engine, user, first) = setup();
    let (_, second) = add_user(&store, "1000000007");

    engine
        .deposit(user.id, first.id, dec!(600), None, None)
        .unwrap();
    engine
        .withdraw(user.id, first.id, dec!(100), None, None)
        .unwrap();
    engine
        .transfer(
            user.id,
            &first.account_number,
            &second.account_number,
            dec!(250),
            None,
            "c-1",
        )
        .unwrap();

    // Sum over all Completed entries equals deposits minus withdrawals;
    // the transfer contributes zero.
    let total: Decimal = store
        .entries_for_account(first.id)
        .iter()
        .chain(store.entries_for_account(second.id).iter())
        .map(|entry| entry.amount)
        .sum();
    assert_eq!(total, dec!(500));

    // Both cached balances still match their ledgers.
    assert!(engine.reconcile(user.id, first.id).unwrap().reconciled);
    assert!(engine
        .reconcile(second.user_id, second.id)
        .unwrap()
        .reconciled);
}

#[test]
fn test_bulk_pipeline_sync() {
    let (store, engine, _, _) = setup();
    let (user, account) = add_user(&store, "7770000001");
    engine
        .deposit(user.id, account.id, dec!(100), None, None)
        .unwrap();

    let csv = "NationalId,Amount,Operation\n\
               7770000001,40.00,DEPOSIT\n\
               7770000001,200.00,WITHDRAW\n\
               7770000001,15.50,WITHDRAW\n";
    let operator = store
        .create_user("9990000001", "Back Office", KycStatus::Verified)
        .unwrap();
    let summary = BulkProcessor::new(Arc::clone(&engine))
        .process(operator.id, Cursor::new(csv.as_bytes()), "ops.csv")
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.rows[2].balance, Some(dec!(124.50)));

    // The batch is consistent with the ledger afterwards.
    assert!(engine.reconcile(user.id, account.id).unwrap().reconciled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bulk_pipeline_streaming() {
    use std::io::Write;

    let (store, engine, _, _) = setup();
    let (user, account) = add_user(&store, "7770000002");
    engine
        .deposit(user.id, account.id, dec!(100), None, None)
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        b"NationalId,Amount,Operation\n\
          7770000002,40.00,DEPOSIT\n\
          7770000002,200.00,WITHDRAW\n\
          7770000002,15.50,WITHDRAW\n",
    )
    .unwrap();
    file.flush().unwrap();

    let operator = store
        .create_user("9990000002", "Back Office", KycStatus::Verified)
        .unwrap();
    let summary = StreamingBulkProcessor::new(Arc::clone(&engine))
        .process_file(operator.id, file.path(), 2)
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.rows[2].balance, Some(dec!(124.50)));
    assert!(engine.reconcile(user.id, account.id).unwrap().reconciled);
}
