//! Dunning rule and assessment models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dunning escalation level, ordered from none to the final demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DunningLevel {
    None,
    Reminder,
    Dunning1,
    Dunning2,
    Dunning3,
}

impl DunningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DunningLevel::None => "none",
            DunningLevel::Reminder => "reminder",
            DunningLevel::Dunning1 => "dunning1",
            DunningLevel::Dunning2 => "dunning2",
            DunningLevel::Dunning3 => "dunning3",
        }
    }
}

/// One threshold stage of a customer's dunning rule set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DunningStage {
    pub level: DunningLevel,
    /// Days after the effective due date at which this stage triggers.
    pub days_after_due: i64,
    pub enabled: bool,
}

/// How default interest is charged for a customer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestPolicy {
    /// A flat annual percentage.
    FlatPercent(Decimal),
    /// The statutory default-interest rate (supplied by configuration).
    LegalRate,
}

/// Per-customer dunning configuration, supplied by the caller at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DunningRuleSet {
    pub stages: Vec<DunningStage>,
    pub interest: InterestPolicy,
}

impl DunningRuleSet {
    /// Days the customer has to pay when the invoice carries no due date.
    pub const DEFAULT_PAYMENT_TERM_DAYS: i64 = 14;
}

/// Read-time enrichment computed for one invoice.
#[derive(Debug, Clone, Serialize)]
pub struct DunningAssessment {
    pub effective_due_date: Option<NaiveDate>,
    pub days_overdue: i64,
    pub level: DunningLevel,
    pub accrued_interest: Decimal,
}
