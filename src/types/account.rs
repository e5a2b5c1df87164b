//! Account-related types for the core banking engine
//!
//! This module defines the Account structure, its type and status tags,
//! and the account number generator.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable internal identifier of a user
pub type UserId = Uuid;

/// Stable internal identifier of an account
pub type AccountId = Uuid;

/// Account type tag
///
/// Determines the prefix of the generated account number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Day-to-day transactional account (`CHK` prefix)
    Checking,

    /// Savings account (`SAV` prefix)
    Savings,

    /// Business account (`BUS` prefix)
    Business,
}

impl AccountType {
    /// The account number prefix for this account type
    pub fn number_prefix(self) -> &'static str {
        match self {
            AccountType::Checking => "CHK",
            AccountType::Savings => "SAV",
            AccountType::Business => "BUS",
        }
    }
}

/// Account lifecycle status
///
/// Status transitions are driven by the surrounding system, never by the
/// engine itself. Closure is a status change; accounts are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// The account accepts deposits, withdrawals, and transfers
    Active,

    /// All monetary operations are rejected until the account is unfrozen
    Frozen,

    /// Terminal state; the account only exists for record keeping
    Closed,
}

/// A customer account
///
/// The `balance` field is a denormalized aggregate of the account's
/// Completed journal entries; it is only ever written together with a new
/// journal entry, inside the same store transaction. The `version` counter
/// backs the optimistic concurrency check: every committed mutation of the
/// row advances it by exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable internal ID
    pub id: AccountId,

    /// Human-readable account number (`{CHK|SAV|BUS}-YYYYMMDD-XXXXXX`)
    ///
    /// Unique and immutable once issued.
    pub account_number: String,

    /// Owning user
    pub user_id: UserId,

    /// Account type tag
    pub account_type: AccountType,

    /// Lifecycle status
    pub status: AccountStatus,

    /// Cached balance: the sum of Completed journal entries on this account
    pub balance: Decimal,

    /// ISO currency code (e.g. "USD")
    pub currency: String,

    /// Monotonic version counter for optimistic concurrency control
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with a zero balance and a freshly
    /// generated account number
    pub fn new(user_id: UserId, account_type: AccountType, currency: &str) -> Self {
        Account {
            id: Uuid::new_v4(),
            account_number: generate_account_number(account_type),
            user_id,
            account_type,
            status: AccountStatus::Active,
            balance: Decimal::ZERO,
            currency: currency.to_string(),
            version: 0,
            created_at: Utc::now(),
        }
    }
}

/// Generate an account number of the form `{prefix}-{YYYYMMDD}-{6 hex}`
///
/// The hex suffix is drawn from the operating system's cryptographic
/// random source. Uniqueness is enforced by the store, not here; callers
/// retry on collision.
pub fn generate_account_number(account_type: AccountType) -> String {
    let mut suffix = [0u8; 3];
    OsRng.fill_bytes(&mut suffix);
    format!(
        "{}-{}-{:02X}{:02X}{:02X}",
        account_type.number_prefix(),
        Utc::now().format("%Y%m%d"),
        suffix[0],
        suffix[1],
        suffix[2],
    )
}
