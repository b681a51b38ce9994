//! Dunning calculator.
//!
//! Pure functions over persisted invoices and caller-supplied rule sets.
//! No I/O: the current date and the statutory interest rate are arguments,
//! which keeps every function deterministic and directly testable.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::models::{
    CachedInvoice, DunningAssessment, DunningLevel, DunningRuleSet, DunningStage, InterestPolicy,
};

/// Days in the interest year for simple daily proration.
const INTEREST_YEAR_DAYS: i64 = 365;

/// The date an invoice becomes due: the explicit due date when present,
/// otherwise `receipt_date + payment_term_days`, otherwise unknown.
pub fn effective_due_date(
    due_date: Option<NaiveDate>,
    receipt_date: Option<NaiveDate>,
    payment_term_days: i64,
) -> Option<NaiveDate> {
    due_date.or_else(|| receipt_date.map(|d| d + Duration::days(payment_term_days)))
}

/// Whole days elapsed since the effective due date; zero when the date is
/// unknown, negative when not yet due.
pub fn days_overdue(effective_due_date: Option<NaiveDate>, today: NaiveDate) -> i64 {
    match effective_due_date {
        Some(due) => (today - due).num_days(),
        None => 0,
    }
}

/// The highest enabled stage whose threshold is reached, evaluated from
/// `dunning3` down to `reminder`. Anything not yet overdue is `None`.
pub fn dunning_level(days_overdue: i64, stages: &[DunningStage]) -> DunningLevel {
    if days_overdue <= 0 {
        return DunningLevel::None;
    }

    for level in [
        DunningLevel::Dunning3,
        DunningLevel::Dunning2,
        DunningLevel::Dunning1,
        DunningLevel::Reminder,
    ] {
        let applies = stages
            .iter()
            .any(|s| s.level == level && s.enabled && days_overdue >= s.days_after_due);
        if applies {
            return level;
        }
    }

    DunningLevel::None
}

/// Simple daily-prorated default interest, not compounding:
/// `open_amount * (rate / 100) * days / 365`, rounded to cents.
/// Zero for anything not overdue or with a non-positive amount or rate.
pub fn accrued_interest(
    open_amount: Decimal,
    days_overdue: i64,
    annual_rate_percent: Decimal,
) -> Decimal {
    if days_overdue <= 0 || open_amount <= Decimal::ZERO || annual_rate_percent <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (open_amount * annual_rate_percent / Decimal::from(100) * Decimal::from(days_overdue)
        / Decimal::from(INTEREST_YEAR_DAYS))
    .round_dp(2)
}

/// Stock escalation schedule applied when a customer carries no bespoke
/// rule set: reminder after 3 days, then formal dunning stages at 14, 28,
/// and 42 days past due.
pub fn default_stages() -> Vec<DunningStage> {
    vec![
        DunningStage {
            level: DunningLevel::Reminder,
            days_after_due: 3,
            enabled: true,
        },
        DunningStage {
            level: DunningLevel::Dunning1,
            days_after_due: 14,
            enabled: true,
        },
        DunningStage {
            level: DunningLevel::Dunning2,
            days_after_due: 28,
            enabled: true,
        },
        DunningStage {
            level: DunningLevel::Dunning3,
            days_after_due: 42,
            enabled: true,
        },
    ]
}

/// Read-time enrichment for one invoice under a customer's rule set.
///
/// A customer without a rule set assesses to `none` / zero interest rather
/// than an error; overdue arithmetic is still reported.
pub fn assess(
    invoice: &CachedInvoice,
    rule_set: Option<&DunningRuleSet>,
    payment_term_days: i64,
    legal_rate_percent: Decimal,
    today: NaiveDate,
) -> DunningAssessment {
    let effective = effective_due_date(invoice.due_date, invoice.receipt_date, payment_term_days);
    let days = days_overdue(effective, today);

    let (level, interest) = match rule_set {
        Some(rules) => {
            let rate = match rules.interest {
                InterestPolicy::FlatPercent(p) => p,
                InterestPolicy::LegalRate => legal_rate_percent,
            };
            (
                dunning_level(days, &rules.stages),
                accrued_interest(invoice.open_amount, days, rate),
            )
        }
        None => (DunningLevel::None, Decimal::ZERO),
    };

    DunningAssessment {
        effective_due_date: effective,
        days_overdue: days,
        level,
        accrued_interest: interest,
    }
}
