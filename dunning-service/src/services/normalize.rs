//! Record normalizer for raw upstream payloads.
//!
//! Upstream invoice records carry their debtor reference in one of several
//! payload shapes depending on record type and API version. Extraction is a
//! declarative list of strategies tried in priority order; the first one
//! producing a positive integer wins. A record that cannot be normalized
//! never aborts the batch: monetary and date fields default to zero/null,
//! and only a missing upsert key rejects the record.

use anyhow::anyhow;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use service_core::error::AppError;
use std::str::FromStr;

use crate::models::{invoice::payment_epsilon, NormalizedDebtor, NormalizedInvoice, PaymentStatus};

/// Debtor-id extraction strategies, highest priority first.
const DEBTOR_ID_EXTRACTORS: &[(&str, fn(&Value) -> Option<i64>)] = &[
    ("counterparty_object", |v| {
        positive_int(v.pointer("/counterparty/postingaccount_number")?)
    }),
    ("debtor_object", |v| {
        positive_int(v.pointer("/debtor/postingaccount_number")?)
    }),
    ("counterparty_number", |v| {
        positive_int(v.get("counterparty_number")?)
    }),
    ("creditor_number", |v| positive_int(v.get("creditor_number")?)),
    ("debtor_number", |v| positive_int(v.get("debtor_number")?)),
];

/// Field names under which upstream reports paid amounts; all variants
/// present on a record are summed.
const PAID_AMOUNT_FIELDS: &[&str] = &["amount_paid", "paid_amount", "amount_credited"];

/// Extract the debtor posting-account number from a raw invoice payload;
/// 0 when no strategy succeeds (unlinked).
pub fn extract_debtor_number(payload: &Value) -> i64 {
    for (_, extract) in DEBTOR_ID_EXTRACTORS {
        if let Some(number) = extract(payload) {
            return number;
        }
    }
    0
}

/// Normalize one raw upstream invoice record.
///
/// `Ok(None)` means the record is soft-deleted upstream and must be dropped.
/// `Err` means the record lacks a usable external id and is counted as a
/// per-record error by the caller.
pub fn normalize_invoice(payload: &Value) -> Result<Option<NormalizedInvoice>, AppError> {
    if is_deleted(payload) {
        return Ok(None);
    }

    let external_id = string_or_number(payload.get("id"))
        .or_else(|| string_or_number(payload.get("external_id")))
        .ok_or_else(|| AppError::BadRequest(anyhow!("invoice record has no external id")))?;

    let total_amount = parse_decimal(payload.get("amount")).abs();
    let total_paid: Decimal = PAID_AMOUNT_FIELDS
        .iter()
        .map(|f| parse_decimal(payload.get(*f)))
        .sum();
    let open_amount = (total_amount - total_paid)
        .max(Decimal::ZERO)
        .min(total_amount);

    let payment_status = if open_amount < payment_epsilon() {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Unpaid
    };

    Ok(Some(NormalizedInvoice {
        external_id,
        invoice_number: opt_string(payload.get("invoice_number"))
            .or_else(|| opt_string(payload.get("number"))),
        counterparty_name: opt_string(payload.pointer("/counterparty/name"))
            .or_else(|| opt_string(payload.get("counterparty_name")))
            .or_else(|| opt_string(payload.pointer("/debtor/name"))),
        receipt_date: parse_date(payload.get("receipt_date"))
            .or_else(|| parse_date(payload.get("date"))),
        due_date: parse_date(payload.get("due_date")),
        total_amount,
        open_amount,
        payment_status,
        posting_account_number: extract_debtor_number(payload),
        raw_payload: payload.clone(),
    }))
}

/// Normalize one raw upstream debtor record.
///
/// `Ok(None)` drops soft-deleted records; a missing or non-positive
/// posting-account number is a per-record error.
pub fn normalize_debtor(payload: &Value) -> Result<Option<NormalizedDebtor>, AppError> {
    if is_deleted(payload) {
        return Ok(None);
    }

    let posting_account_number = payload
        .get("postingaccount_number")
        .and_then(positive_int)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow!("debtor record has no posting-account number"))
        })?;

    Ok(Some(NormalizedDebtor {
        posting_account_number,
        name: opt_string(payload.get("name")).unwrap_or_default(),
        email: opt_string(payload.get("email")),
        contact_person: opt_string(payload.get("contact_person")),
        street: opt_string(payload.get("street")),
        zip_code: opt_string(payload.get("zip_code")).or_else(|| opt_string(payload.get("zip"))),
        city: opt_string(payload.get("city")),
        country: opt_string(payload.get("country")),
        vat_id: opt_string(payload.get("vat_id")),
        tax_number: opt_string(payload.get("tax_number")),
        iban: opt_string(payload.get("iban")),
        bic: opt_string(payload.get("bic")),
    }))
}

fn is_deleted(payload: &Value) -> bool {
    payload
        .get("deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// A positive integer from a JSON number or numeric string.
fn positive_int(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (number > 0).then_some(number)
}

/// Lenient decimal parse; malformed or absent values default to zero.
fn parse_decimal(value: Option<&Value>) -> Decimal {
    match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).unwrap_or_default(),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Lenient date parse (`YYYY-MM-DD`, datetime prefixes accepted); malformed
/// values default to null.
fn parse_date(value: Option<&Value>) -> Option<NaiveDate> {
    let s = value?.as_str()?;
    let prefix = s.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn string_or_number(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_string(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}
