//! Reconciliation store port.
//!
//! The sync orchestrator and the REST surface talk to persisted state only
//! through this trait. The production implementation is the Postgres-backed
//! [`Database`](crate::services::Database); tests substitute an in-memory
//! store.

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    CachedInvoice, CounterpartyException, Customer, ManualMapping, NormalizedDebtor,
    NormalizedInvoice,
};

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    // Customers ---------------------------------------------------------

    async fn get_customer_by_number(&self, number: i64) -> Result<Option<Customer>, AppError>;

    async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError>;

    /// All customers, ordered by posting-account number ascending. The
    /// ordering is part of the contract: fuzzy-match tie-breaking depends
    /// on a stable scan order.
    async fn list_customers(&self) -> Result<Vec<Customer>, AppError>;

    async fn create_customer(
        &self,
        number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: Option<&str>,
    ) -> Result<Customer, AppError>;

    async fn update_customer(
        &self,
        customer_id: Uuid,
        debtor: &NormalizedDebtor,
        sync_hash: &str,
    ) -> Result<(), AppError>;

    /// Next free locally-assigned placeholder number (>= 80000).
    async fn next_placeholder_number(&self) -> Result<i64, AppError>;

    /// Atomically move a customer from `old_number` to `new_number`,
    /// rewriting every cached invoice linked to `old_number` in the same
    /// transaction and applying `debtor`/`sync_hash` to the customer row.
    /// On failure nothing is changed and the caller must treat the
    /// customer as untouched.
    async fn renumber_customer(
        &self,
        customer_id: Uuid,
        old_number: i64,
        new_number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: &str,
    ) -> Result<(), AppError>;

    // Invoices ----------------------------------------------------------

    async fn get_invoice_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<CachedInvoice>, AppError>;

    async fn list_invoices_for_customer(
        &self,
        number: i64,
    ) -> Result<Vec<CachedInvoice>, AppError>;

    /// Invoices with posting-account number 0 (no linked customer).
    async fn list_unlinked_invoices(&self) -> Result<Vec<CachedInvoice>, AppError>;

    async fn insert_invoice(&self, record: &NormalizedInvoice) -> Result<(), AppError>;

    async fn update_invoice(
        &self,
        external_id: &str,
        record: &NormalizedInvoice,
    ) -> Result<(), AppError>;

    /// Point an invoice at a customer's posting-account number.
    async fn link_invoice(&self, external_id: &str, number: i64) -> Result<(), AppError>;

    // Manual mappings and exceptions -------------------------------------

    async fn get_manual_mapping(
        &self,
        counterparty_name: &str,
    ) -> Result<Option<ManualMapping>, AppError>;

    async fn list_manual_mappings(&self) -> Result<Vec<ManualMapping>, AppError>;

    async fn create_manual_mapping(
        &self,
        counterparty_name: &str,
        number: i64,
    ) -> Result<ManualMapping, AppError>;

    async fn delete_manual_mapping(&self, counterparty_name: &str) -> Result<(), AppError>;

    async fn list_exceptions(&self) -> Result<Vec<CounterpartyException>, AppError>;

    async fn create_exception(
        &self,
        counterparty_name: &str,
    ) -> Result<CounterpartyException, AppError>;

    async fn delete_exception(&self, counterparty_name: &str) -> Result<(), AppError>;

    /// Distinct counterparty names on unlinked invoices, minus names that
    /// already carry a manual mapping or an exception.
    async fn list_unmatched_counterparties(&self) -> Result<Vec<String>, AppError>;
}
