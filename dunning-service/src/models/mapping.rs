//! Manual counterparty mappings and reporting exceptions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A user-asserted pairing of a raw counterparty name to a posting-account
/// number. Overrides fuzzy matching permanently; at most one mapping per
/// counterparty name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ManualMapping {
    pub mapping_id: Uuid,
    pub counterparty_name: String,
    pub posting_account_number: i64,
    pub created_utc: DateTime<Utc>,
}

/// A counterparty name explicitly excluded from unmatched-name reporting.
/// Has no effect on linking.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CounterpartyException {
    pub exception_id: Uuid,
    pub counterparty_name: String,
    pub created_utc: DateTime<Utc>,
}
