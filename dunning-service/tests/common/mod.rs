//! Shared test doubles: an in-memory store and a scripted upstream API.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dunning_service::models::{
    CachedInvoice, CounterpartyException, Customer, ManualMapping, NormalizedDebtor,
    NormalizedInvoice,
};
use dunning_service::services::{ReconciliationStore, UpstreamApi};
use serde_json::{json, Value};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    customers: Vec<Customer>,
    invoices: Vec<CachedInvoice>,
    mappings: Vec<ManualMapping>,
    exceptions: Vec<CounterpartyException>,
}

/// In-memory `ReconciliationStore` for hermetic sync cycle tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    /// When set, `renumber_customer` fails without touching state.
    pub fail_renumber: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn customer_from(
        number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: Option<&str>,
    ) -> Customer {
        let now = Utc::now();
        Customer {
            customer_id: Uuid::new_v4(),
            posting_account_number: number,
            name: debtor.name.clone(),
            email: debtor.email.clone(),
            contact_person: debtor.contact_person.clone(),
            street: debtor.street.clone(),
            zip_code: debtor.zip_code.clone(),
            city: debtor.city.clone(),
            country: debtor.country.clone(),
            vat_id: debtor.vat_id.clone(),
            tax_number: debtor.tax_number.clone(),
            iban: debtor.iban.clone(),
            bic: debtor.bic.clone(),
            last_sync_hash: sync_hash.map(str::to_string),
            last_synced_utc: sync_hash.map(|_| now),
            created_utc: now,
            updated_utc: now,
        }
    }

    fn apply_debtor(customer: &mut Customer, debtor: &NormalizedDebtor, sync_hash: &str) {
        customer.name = debtor.name.clone();
        customer.email = debtor.email.clone();
        customer.contact_person = debtor.contact_person.clone();
        customer.street = debtor.street.clone();
        customer.zip_code = debtor.zip_code.clone();
        customer.city = debtor.city.clone();
        customer.country = debtor.country.clone();
        customer.vat_id = debtor.vat_id.clone();
        customer.tax_number = debtor.tax_number.clone();
        customer.iban = debtor.iban.clone();
        customer.bic = debtor.bic.clone();
        customer.last_sync_hash = Some(sync_hash.to_string());
        customer.last_synced_utc = Some(Utc::now());
        customer.updated_utc = Utc::now();
    }

    /// Seed a customer row directly, bypassing the sync path.
    pub fn seed_customer(&self, number: i64, name: &str) -> Uuid {
        let debtor = NormalizedDebtor {
            posting_account_number: number,
            name: name.to_string(),
            ..Default::default()
        };
        let customer = Self::customer_from(number, &debtor, None);
        let id = customer.customer_id;
        self.state.lock().unwrap().customers.push(customer);
        id
    }

    /// Seed an already-cached invoice row.
    pub fn seed_invoice(&self, external_id: &str, counterparty: Option<&str>, number: i64) {
        let now = Utc::now();
        self.state.lock().unwrap().invoices.push(CachedInvoice {
            invoice_id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            invoice_number: None,
            counterparty_name: counterparty.map(str::to_string),
            receipt_date: None,
            due_date: None,
            total_amount: rust_decimal::Decimal::new(10000, 2),
            open_amount: rust_decimal::Decimal::new(10000, 2),
            payment_status: "unpaid".to_string(),
            posting_account_number: number,
            raw_payload: json!({}),
            last_synced_utc: now,
            created_utc: now,
        });
    }

    pub fn customer(&self, number: i64) -> Option<Customer> {
        self.state
            .lock()
            .unwrap()
            .customers
            .iter()
            .find(|c| c.posting_account_number == number)
            .cloned()
    }

    pub fn invoice(&self, external_id: &str) -> Option<CachedInvoice> {
        self.state
            .lock()
            .unwrap()
            .invoices
            .iter()
            .find(|i| i.external_id == external_id)
            .cloned()
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn get_customer_by_number(&self, number: i64) -> Result<Option<Customer>, AppError> {
        Ok(self.customer(number))
    }

    async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .customers
            .iter()
            .find(|c| c.customer_id == customer_id)
            .cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, AppError> {
        let mut customers = self.state.lock().unwrap().customers.clone();
        customers.sort_by_key(|c| c.posting_account_number);
        Ok(customers)
    }

    async fn create_customer(
        &self,
        number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: Option<&str>,
    ) -> Result<Customer, AppError> {
        let customer = Self::customer_from(number, debtor, sync_hash);
        let mut state = self.state.lock().unwrap();
        if state
            .customers
            .iter()
            .any(|c| c.posting_account_number == number)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "number {} already taken",
                number
            )));
        }
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn update_customer(
        &self,
        customer_id: Uuid,
        debtor: &NormalizedDebtor,
        sync_hash: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let customer = state
            .customers
            .iter_mut()
            .find(|c| c.customer_id == customer_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("customer not found")))?;
        Self::apply_debtor(customer, debtor, sync_hash);
        Ok(())
    }

    async fn next_placeholder_number(&self) -> Result<i64, AppError> {
        let state = self.state.lock().unwrap();
        let max = state
            .customers
            .iter()
            .map(|c| c.posting_account_number)
            .filter(|n| *n >= dunning_service::models::PLACEHOLDER_BASE)
            .max()
            .unwrap_or(dunning_service::models::PLACEHOLDER_BASE - 1);
        Ok(max + 1)
    }

    async fn renumber_customer(
        &self,
        customer_id: Uuid,
        old_number: i64,
        new_number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: &str,
    ) -> Result<(), AppError> {
        if self.fail_renumber.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected renumbering failure"
            )));
        }

        let mut state = self.state.lock().unwrap();
        let holds_number = state
            .customers
            .iter()
            .any(|c| c.customer_id == customer_id && c.posting_account_number == old_number);
        if !holds_number {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "customer no longer holds number {}",
                old_number
            )));
        }

        for invoice in &mut state.invoices {
            if invoice.posting_account_number == old_number {
                invoice.posting_account_number = new_number;
            }
        }
        let customer = state
            .customers
            .iter_mut()
            .find(|c| c.customer_id == customer_id)
            .unwrap();
        customer.posting_account_number = new_number;
        Self::apply_debtor(customer, debtor, sync_hash);
        Ok(())
    }

    async fn get_invoice_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<CachedInvoice>, AppError> {
        Ok(self.invoice(external_id))
    }

    async fn list_invoices_for_customer(
        &self,
        number: i64,
    ) -> Result<Vec<CachedInvoice>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .iter()
            .filter(|i| i.posting_account_number == number)
            .cloned()
            .collect())
    }

    async fn list_unlinked_invoices(&self) -> Result<Vec<CachedInvoice>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .iter()
            .filter(|i| i.posting_account_number == 0)
            .cloned()
            .collect())
    }

    async fn insert_invoice(&self, record: &NormalizedInvoice) -> Result<(), AppError> {
        let now = Utc::now();
        self.state.lock().unwrap().invoices.push(CachedInvoice {
            invoice_id: Uuid::new_v4(),
            external_id: record.external_id.clone(),
            invoice_number: record.invoice_number.clone(),
            counterparty_name: record.counterparty_name.clone(),
            receipt_date: record.receipt_date,
            due_date: record.due_date,
            total_amount: record.total_amount,
            open_amount: record.open_amount,
            payment_status: record.payment_status.as_str().to_string(),
            posting_account_number: record.posting_account_number,
            raw_payload: record.raw_payload.clone(),
            last_synced_utc: now,
            created_utc: now,
        });
        Ok(())
    }

    async fn update_invoice(
        &self,
        external_id: &str,
        record: &NormalizedInvoice,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let invoice = state
            .invoices
            .iter_mut()
            .find(|i| i.external_id == external_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice not found")))?;
        invoice.invoice_number = record.invoice_number.clone();
        invoice.counterparty_name = record.counterparty_name.clone();
        invoice.receipt_date = record.receipt_date;
        invoice.due_date = record.due_date;
        invoice.total_amount = record.total_amount;
        invoice.open_amount = record.open_amount;
        invoice.payment_status = record.payment_status.as_str().to_string();
        invoice.posting_account_number = record.posting_account_number;
        invoice.raw_payload = record.raw_payload.clone();
        invoice.last_synced_utc = Utc::now();
        Ok(())
    }

    async fn link_invoice(&self, external_id: &str, number: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let invoice = state
            .invoices
            .iter_mut()
            .find(|i| i.external_id == external_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice not found")))?;
        invoice.posting_account_number = number;
        Ok(())
    }

    async fn get_manual_mapping(
        &self,
        counterparty_name: &str,
    ) -> Result<Option<ManualMapping>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .mappings
            .iter()
            .find(|m| m.counterparty_name == counterparty_name)
            .cloned())
    }

    async fn list_manual_mappings(&self) -> Result<Vec<ManualMapping>, AppError> {
        Ok(self.state.lock().unwrap().mappings.clone())
    }

    async fn create_manual_mapping(
        &self,
        counterparty_name: &str,
        number: i64,
    ) -> Result<ManualMapping, AppError> {
        let mapping = ManualMapping {
            mapping_id: Uuid::new_v4(),
            counterparty_name: counterparty_name.to_string(),
            posting_account_number: number,
            created_utc: Utc::now(),
        };
        let mut state = self.state.lock().unwrap();
        state
            .mappings
            .retain(|m| m.counterparty_name != counterparty_name);
        state.mappings.push(mapping.clone());
        Ok(mapping)
    }

    async fn delete_manual_mapping(&self, counterparty_name: &str) -> Result<(), AppError> {
        self.state
            .lock()
            .unwrap()
            .mappings
            .retain(|m| m.counterparty_name != counterparty_name);
        Ok(())
    }

    async fn list_exceptions(&self) -> Result<Vec<CounterpartyException>, AppError> {
        Ok(self.state.lock().unwrap().exceptions.clone())
    }

    async fn create_exception(
        &self,
        counterparty_name: &str,
    ) -> Result<CounterpartyException, AppError> {
        let exception = CounterpartyException {
            exception_id: Uuid::new_v4(),
            counterparty_name: counterparty_name.to_string(),
            created_utc: Utc::now(),
        };
        let mut state = self.state.lock().unwrap();
        state
            .exceptions
            .retain(|e| e.counterparty_name != counterparty_name);
        state.exceptions.push(exception.clone());
        Ok(exception)
    }

    async fn delete_exception(&self, counterparty_name: &str) -> Result<(), AppError> {
        self.state
            .lock()
            .unwrap()
            .exceptions
            .retain(|e| e.counterparty_name != counterparty_name);
        Ok(())
    }

    async fn list_unmatched_counterparties(&self) -> Result<Vec<String>, AppError> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .invoices
            .iter()
            .filter(|i| i.posting_account_number == 0)
            .filter_map(|i| i.counterparty_name.clone())
            .filter(|n| {
                !state.mappings.iter().any(|m| &m.counterparty_name == n)
                    && !state.exceptions.iter().any(|e| &e.counterparty_name == n)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Upstream API double that serves fixed record sets a page at a time.
pub struct ScriptedUpstream {
    pub debtors: Vec<Value>,
    pub invoices: Vec<Value>,
    pub fail_debtors: AtomicBool,
    pub fail_invoices: AtomicBool,
    /// Debtor fetches at or beyond this offset fail.
    pub fail_debtors_from: AtomicU64,
}

impl ScriptedUpstream {
    pub fn new(debtors: Vec<Value>, invoices: Vec<Value>) -> Self {
        Self {
            debtors,
            invoices,
            fail_debtors: AtomicBool::new(false),
            fail_invoices: AtomicBool::new(false),
            fail_debtors_from: AtomicU64::new(u64::MAX),
        }
    }

    fn page(records: &[Value], offset: u64, limit: u64) -> Vec<Value> {
        let start = (offset as usize).min(records.len());
        let end = (start + limit as usize).min(records.len());
        records[start..end].to_vec()
    }
}

#[async_trait]
impl UpstreamApi for ScriptedUpstream {
    async fn fetch_debtors(&self, offset: u64, limit: u64) -> Result<Vec<Value>, AppError> {
        if self.fail_debtors.load(Ordering::SeqCst)
            || offset >= self.fail_debtors_from.load(Ordering::SeqCst)
        {
            return Err(AppError::UpstreamError(anyhow::anyhow!(
                "injected debtor fetch failure"
            )));
        }
        Ok(Self::page(&self.debtors, offset, limit))
    }

    async fn fetch_invoices(&self, offset: u64, limit: u64) -> Result<Vec<Value>, AppError> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamError(anyhow::anyhow!(
                "injected invoice fetch failure"
            )));
        }
        Ok(Self::page(&self.invoices, offset, limit))
    }
}

/// Raw debtor payload as the upstream API would serve it.
pub fn debtor_payload(number: i64, name: &str) -> Value {
    json!({
        "postingaccount_number": number,
        "name": name,
        "email": format!("billing@{}.example", name.to_lowercase().replace(' ', "-")),
        "city": "Berlin",
        "country": "DE",
    })
}

/// Raw invoice payload. Amounts may be negative; the engine normalizes them.
pub fn invoice_payload(
    external_id: &str,
    invoice_number: &str,
    counterparty: &str,
    amount: f64,
    paid: f64,
) -> Value {
    json!({
        "id": external_id,
        "invoice_number": invoice_number,
        "counterparty": { "name": counterparty },
        "amount": amount,
        "amount_paid": paid,
        "date": "2026-01-10",
        "due_date": "2026-01-24",
    })
}
