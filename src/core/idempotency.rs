//! Idempotency layer: recognizes repeated operation submissions
//!
//! The gate is consulted before an operation opens its store transaction.
//! A key that was already completed is answered from the stored response
//! body; a key whose operation is still running is reported as in flight;
//! an unknown key is admitted and marked pending so a concurrent
//! duplicate can be detected.
//!
//! Two concurrent duplicates may still both be admitted (the pending
//! marker is written without a reservation lock); for transfers the
//! unique constraint on the transfer operation key closes that window.

use chrono::Utc;
use tracing::warn;

use crate::store::Store;
use crate::types::{EngineError, IdempotencyRecord, UserId};

/// The gate's verdict for a submitted operation key
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The key is new; proceed and record the result after commit
    Proceed,

    /// The key completed earlier; return the stored response body
    Replay(String),

    /// The key was admitted but has not completed
    InFlight,
}

/// Deduplication gate over the store's idempotency table
#[derive(Debug)]
pub struct IdempotencyGate<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> IdempotencyGate<'a, S> {
    /// Create a gate over `store`
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Look up `(operation_key, user_id)` and decide how to proceed
    ///
    /// On a miss, a pending marker (completed = false) is written before
    /// `Proceed` is returned, so a second submission arriving while the
    /// first is still running observes `InFlight`.
    pub fn admit(
        &self,
        user_id: UserId,
        operation_key: &str,
        path: &str,
    ) -> Result<Admission, EngineError> {
        match self.store.idempotency_record(operation_key, user_id)? {
            Some(record) if record.completed => {
                Ok(Admission::Replay(record.response_body.unwrap_or_default()))
            }
            Some(_) => Ok(Admission::InFlight),
            None => {
                let now = Utc::now();
                self.store.upsert_idempotency_record(IdempotencyRecord {
                    operation_key: operation_key.to_string(),
                    user_id,
                    path: path.to_string(),
                    completed: false,
                    response_body: None,
                    created_at: now,
                    updated_at: now,
                })?;
                Ok(Admission::Proceed)
            }
        }
    }

    /// Record a completed operation's response body for replay
    pub fn record(
        &self,
        user_id: UserId,
        operation_key: &str,
        path: &str,
        response_body: String,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        self.store.upsert_idempotency_record(IdempotencyRecord {
            operation_key: operation_key.to_string(),
            user_id,
            path: path.to_string(),
            completed: true,
            response_body: Some(response_body),
            created_at: now,
            updated_at: now,
        })?;
        Ok(())
    }

    /// Remove the pending marker for an operation that did not commit
    ///
    /// Best-effort: a failure here only means a later submission of the
    /// same key is rejected as in flight instead of re-executing.
    pub fn release(&self, user_id: UserId, operation_key: &str) {
        if let Err(error) = self.store.remove_idempotency_record(operation_key, user_id) {
            warn!(%error, operation_key, "failed to release pending idempotency marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use uuid::Uuid;

    #[test]
    fn test_admit_unknown_key_proceeds_and_marks_pending() {
        let store = MemoryStore::new();
        let gate = IdempotencyGate::new(&store);
        let user = Uuid::new_v4();

        let admission = gate.admit(user, "k1", "deposit").unwrap();
        assert_eq!(admission, Admission::Proceed);

        let record = store.idempotency_record("k1", user).unwrap().unwrap();
        assert!(!record.completed);
        assert_eq!(record.path, "deposit");
    }

    #[test]
    fn test_admit_pending_key_reports_in_flight() {
        let store = MemoryStore::new();
        let gate = IdempotencyGate::new(&store);
        let user = Uuid::new_v4();

        gate.admit(user, "k1", "deposit").unwrap();
        let second = gate.admit(user, "k1", "deposit").unwrap();
        assert_eq!(second, Admission::InFlight);
    }

    #[test]
    fn test_admit_completed_key_replays_body() {
        let store = MemoryStore::new();
        let gate = IdempotencyGate::new(&store);
        let user = Uuid::new_v4();

        gate.admit(user, "k1", "deposit").unwrap();
        gate.record(user, "k1", "deposit", "{\"balance\":\"10\"}".to_string())
            .unwrap();

        let admission = gate.admit(user, "k1", "deposit").unwrap();
        assert_eq!(
            admission,
            Admission::Replay("{\"balance\":\"10\"}".to_string())
        );
    }

    #[test]
    fn test_keys_are_scoped_per_user() {
        let store = MemoryStore::new();
        let gate = IdempotencyGate::new(&store);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        gate.admit(first, "k1", "deposit").unwrap();
        gate.record(first, "k1", "deposit", "{}".to_string()).unwrap();

        // The same key from a different user is a fresh operation.
        let admission = gate.admit(second, "k1", "deposit").unwrap();
        assert_eq!(admission, Admission::Proceed);
    }

    #[test]
    fn test_release_clears_pending_marker() {
        let store = MemoryStore::new();
        let gate = IdempotencyGate::new(&store);
        let user = Uuid::new_v4();

        gate.admit(user, "k1", "deposit").unwrap();
        gate.release(user, "k1");

        let admission = gate.admit(user, "k1", "deposit").unwrap();
        assert_eq!(admission, Admission::Proceed);
    }
}
