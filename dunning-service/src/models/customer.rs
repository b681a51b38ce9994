//! Customer (local debtor) model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Posting-account numbers at or above this value are locally assigned
/// placeholders for customers discovered only through invoice text. Numbers
/// below it are authoritative upstream numbers.
pub const PLACEHOLDER_BASE: i64 = 80_000;

/// A local customer record, keyed by its posting-account number.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub posting_account_number: i64,
    pub name: String,
    pub email: Option<String>,
    pub contact_person: Option<String>,
    pub street: Option<String>,
    pub zip_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub vat_id: Option<String>,
    pub tax_number: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    /// Digest of the last-seen upstream record; `None` until the first sync.
    pub last_sync_hash: Option<String>,
    pub last_synced_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Customer {
    /// Whether this customer still carries a locally assigned number and is
    /// waiting for an authoritative number from upstream.
    pub fn is_placeholder(&self) -> bool {
        self.posting_account_number >= PLACEHOLDER_BASE
    }
}
