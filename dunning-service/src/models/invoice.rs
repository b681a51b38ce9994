//! Cached invoice (receipt) model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status of a cached invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
        }
    }
}

/// An invoice pulled from upstream and cached locally, keyed by the
/// upstream-supplied external id.
///
/// Invariants: `0 <= open_amount <= total_amount`, and
/// `payment_status = "paid"` exactly when `open_amount` is below the
/// payment epsilon.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CachedInvoice {
    pub invoice_id: Uuid,
    pub external_id: String,
    pub invoice_number: Option<String>,
    pub counterparty_name: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub open_amount: Decimal,
    pub payment_status: String,
    /// Owning customer's posting-account number; 0 = unlinked.
    pub posting_account_number: i64,
    /// Raw upstream payload, retained for fallback extraction and debugging.
    pub raw_payload: serde_json::Value,
    pub last_synced_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl CachedInvoice {
    pub fn is_linked(&self) -> bool {
        self.posting_account_number != 0
    }
}

/// Open amounts below this are considered settled.
pub fn payment_epsilon() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
