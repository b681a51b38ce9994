//! Invoice reconciliation and dunning engine.
//!
//! Pulls debtor and invoice records from an upstream accounting API,
//! reconciles them into a local Postgres cache, links invoices to customers,
//! and derives dunning levels and accrued interest for overdue invoices.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
