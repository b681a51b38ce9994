//! Canonical records produced by the record normalizer.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::PaymentStatus;

/// A debtor record normalized from a raw upstream payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDebtor {
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
}

/// An invoice record normalized from a raw upstream payload.
#[derive(Debug, Clone)]
pub struct NormalizedInvoice {
    pub external_id: String,
    pub invoice_number: Option<String>,
    pub counterparty_name: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Magnitude of the upstream amount; never negative.
    pub total_amount: Decimal,
    /// `max(0, total_amount - total paid)`; never exceeds `total_amount`.
    pub open_amount: Decimal,
    pub payment_status: PaymentStatus,
    /// Debtor posting-account number extracted from the payload; 0 = unlinked.
    pub posting_account_number: i64,
    pub raw_payload: serde_json::Value,
}
