//! Idempotency record type
//!
//! Deduplicates retried operations. A record is keyed by
//! `(operation key, user)`; a completed record carries the serialized
//! response body that is returned verbatim on replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::UserId;

/// One remembered operation submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Caller-supplied opaque key (1..=100 characters)
    pub operation_key: String,

    /// The submitting user; keys are scoped per user
    pub user_id: UserId,

    /// Which operation path the key was used on (e.g. "deposit")
    pub path: String,

    /// True once the operation committed and its response was recorded
    pub completed: bool,

    /// Serialized response body to return on replay (set when completed)
    pub response_body: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}
