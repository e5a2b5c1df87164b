//! Minimal user profile consumed by the bulk processor
//!
//! User registration, authentication, and the KYC workflow are owned by the
//! surrounding system. The engine only needs to resolve a national ID to a
//! verified owner of a checking account when processing bulk instruction
//! files, so this profile carries just enough state for that lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::UserId;

/// Know-your-customer verification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KycStatus {
    /// Documents submitted, not yet reviewed
    Pending,

    /// Identity confirmed; the user may hold accounts
    Verified,

    /// Verification failed
    Rejected,
}

/// A bank customer, as far as the engine needs to know them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable internal ID
    pub id: UserId,

    /// Government-issued national ID (unique)
    pub national_id: String,

    /// Display name
    pub full_name: String,

    /// Verification state
    pub kyc_status: KycStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a new user profile
    pub fn new(national_id: &str, full_name: &str, kyc_status: KycStatus) -> Self {
        UserProfile {
            id: Uuid::new_v4(),
            national_id: national_id.to_string(),
            full_name: full_name.to_string(),
            kyc_status,
            created_at: Utc::now(),
        }
    }
}
