//! Postgres-backed reconciliation store.

use crate::models::{
    CachedInvoice, CounterpartyException, Customer, ManualMapping, NormalizedDebtor,
    NormalizedInvoice, PLACEHOLDER_BASE,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::ReconciliationStore;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CUSTOMER_COLUMNS: &str = "customer_id, posting_account_number, name, email, \
     contact_person, street, zip_code, city, country, vat_id, tax_number, iban, bic, \
     last_sync_hash, last_synced_utc, created_utc, updated_utc";

const INVOICE_COLUMNS: &str = "invoice_id, external_id, invoice_number, counterparty_name, \
     receipt_date, due_date, total_amount, open_amount, payment_status, \
     posting_account_number, raw_payload, last_synced_utc, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "dunning-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl ReconciliationStore for Database {
    #[instrument(skip(self))]
    async fn get_customer_by_number(&self, number: i64) -> Result<Option<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer_by_number"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE posting_account_number = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e)))?;

        timer.observe_duration();
        Ok(customer)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn get_customer_by_id(&self, customer_id: Uuid) -> Result<Option<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer_by_id"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE customer_id = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e)))?;

        timer.observe_duration();
        Ok(customer)
    }

    #[instrument(skip(self))]
    async fn list_customers(&self) -> Result<Vec<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customers"])
            .start_timer();

        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers ORDER BY posting_account_number",
            CUSTOMER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list customers: {}", e))
        })?;

        timer.observe_duration();
        Ok(customers)
    }

    #[instrument(skip(self, debtor, sync_hash), fields(number = number))]
    async fn create_customer(
        &self,
        number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: Option<&str>,
    ) -> Result<Customer, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(&format!(
            "INSERT INTO customers (customer_id, posting_account_number, name, email, \
                 contact_person, street, zip_code, city, country, vat_id, tax_number, \
                 iban, bic, last_sync_hash, last_synced_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                 CASE WHEN $14::text IS NULL THEN NULL ELSE NOW() END) \
             RETURNING {}",
            CUSTOMER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(number)
        .bind(&debtor.name)
        .bind(&debtor.email)
        .bind(&debtor.contact_person)
        .bind(&debtor.street)
        .bind(&debtor.zip_code)
        .bind(&debtor.city)
        .bind(&debtor.country)
        .bind(&debtor.vat_id)
        .bind(&debtor.tax_number)
        .bind(&debtor.iban)
        .bind(&debtor.bic)
        .bind(sync_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create customer: {}", e))
        })?;

        timer.observe_duration();
        info!(
            customer_id = %customer.customer_id,
            number = number,
            "Customer created"
        );

        Ok(customer)
    }

    #[instrument(skip(self, debtor, sync_hash), fields(customer_id = %customer_id))]
    async fn update_customer(
        &self,
        customer_id: Uuid,
        debtor: &NormalizedDebtor,
        sync_hash: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_customer"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE customers \
             SET name = $2, email = $3, contact_person = $4, street = $5, zip_code = $6, \
                 city = $7, country = $8, vat_id = $9, tax_number = $10, iban = $11, \
                 bic = $12, last_sync_hash = $13, last_synced_utc = NOW(), updated_utc = NOW() \
             WHERE customer_id = $1",
        )
        .bind(customer_id)
        .bind(&debtor.name)
        .bind(&debtor.email)
        .bind(&debtor.contact_person)
        .bind(&debtor.street)
        .bind(&debtor.zip_code)
        .bind(&debtor.city)
        .bind(&debtor.country)
        .bind(&debtor.vat_id)
        .bind(&debtor.tax_number)
        .bind(&debtor.iban)
        .bind(&debtor.bic)
        .bind(sync_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update customer: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Customer {} not found",
                customer_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn next_placeholder_number(&self) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_placeholder_number"])
            .start_timer();

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(posting_account_number), $1 - 1) + 1 \
             FROM customers WHERE posting_account_number >= $1",
        )
        .bind(PLACEHOLDER_BASE)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get placeholder number: {}", e))
        })?;

        timer.observe_duration();
        Ok(next)
    }

    #[instrument(
        skip(self, debtor, sync_hash),
        fields(customer_id = %customer_id, old_number = old_number, new_number = new_number)
    )]
    async fn renumber_customer(
        &self,
        customer_id: Uuid,
        old_number: i64,
        new_number: i64,
        debtor: &NormalizedDebtor,
        sync_hash: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["renumber_customer"])
            .start_timer();

        // Invoices are linked by number, not by the customer's durable id;
        // renumbering without the invoice rewrite would orphan history.
        // Both updates commit or roll back as a unit.
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let relinked = sqlx::query(
            "UPDATE cached_invoices SET posting_account_number = $2 \
             WHERE posting_account_number = $1",
        )
        .bind(old_number)
        .bind(new_number)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to relink invoices: {}", e))
        })?;

        let updated = sqlx::query(
            "UPDATE customers \
             SET posting_account_number = $3, name = $4, email = $5, contact_person = $6, \
                 street = $7, zip_code = $8, city = $9, country = $10, vat_id = $11, \
                 tax_number = $12, iban = $13, bic = $14, last_sync_hash = $15, \
                 last_synced_utc = NOW(), updated_utc = NOW() \
             WHERE customer_id = $1 AND posting_account_number = $2",
        )
        .bind(customer_id)
        .bind(old_number)
        .bind(new_number)
        .bind(&debtor.name)
        .bind(&debtor.email)
        .bind(&debtor.contact_person)
        .bind(&debtor.street)
        .bind(&debtor.zip_code)
        .bind(&debtor.city)
        .bind(&debtor.country)
        .bind(&debtor.vat_id)
        .bind(&debtor.tax_number)
        .bind(&debtor.iban)
        .bind(&debtor.bic)
        .bind(sync_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to renumber customer: {}", e))
        })?;

        if updated.rows_affected() != 1 {
            tx.rollback().await.ok();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Customer {} no longer holds number {}",
                customer_id,
                old_number
            )));
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit renumbering: {}", e))
        })?;

        timer.observe_duration();
        info!(
            relinked_invoices = relinked.rows_affected(),
            "Customer renumbered"
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_invoice_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<CachedInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_by_external_id"])
            .start_timer();

        let invoice = sqlx::query_as::<_, CachedInvoice>(&format!(
            "SELECT {} FROM cached_invoices WHERE external_id = $1",
            INVOICE_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn list_invoices_for_customer(
        &self,
        number: i64,
    ) -> Result<Vec<CachedInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices_for_customer"])
            .start_timer();

        let invoices = sqlx::query_as::<_, CachedInvoice>(&format!(
            "SELECT {} FROM cached_invoices WHERE posting_account_number = $1 \
             ORDER BY receipt_date NULLS LAST, external_id",
            INVOICE_COLUMNS
        ))
        .bind(number)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e))
        })?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self))]
    async fn list_unlinked_invoices(&self) -> Result<Vec<CachedInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unlinked_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, CachedInvoice>(&format!(
            "SELECT {} FROM cached_invoices WHERE posting_account_number = 0 \
             ORDER BY external_id",
            INVOICE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list unlinked invoices: {}", e))
        })?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self, record), fields(external_id = %record.external_id))]
    async fn insert_invoice(&self, record: &NormalizedInvoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(
            "INSERT INTO cached_invoices (invoice_id, external_id, invoice_number, \
                 counterparty_name, receipt_date, due_date, total_amount, open_amount, \
                 payment_status, posting_account_number, raw_payload, last_synced_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(&record.external_id)
        .bind(&record.invoice_number)
        .bind(&record.counterparty_name)
        .bind(record.receipt_date)
        .bind(record.due_date)
        .bind(record.total_amount)
        .bind(record.open_amount)
        .bind(record.payment_status.as_str())
        .bind(record.posting_account_number)
        .bind(&record.raw_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, record), fields(external_id = %external_id))]
    async fn update_invoice(
        &self,
        external_id: &str,
        record: &NormalizedInvoice,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE cached_invoices \
             SET invoice_number = $2, counterparty_name = $3, receipt_date = $4, \
                 due_date = $5, total_amount = $6, open_amount = $7, payment_status = $8, \
                 posting_account_number = $9, raw_payload = $10, last_synced_utc = NOW() \
             WHERE external_id = $1",
        )
        .bind(external_id)
        .bind(&record.invoice_number)
        .bind(&record.counterparty_name)
        .bind(record.receipt_date)
        .bind(record.due_date)
        .bind(record.total_amount)
        .bind(record.open_amount)
        .bind(record.payment_status.as_str())
        .bind(record.posting_account_number)
        .bind(&record.raw_payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e))
        })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                external_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn link_invoice(&self, external_id: &str, number: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_invoice"])
            .start_timer();

        sqlx::query(
            "UPDATE cached_invoices SET posting_account_number = $2 WHERE external_id = $1",
        )
        .bind(external_id)
        .bind(number)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to link invoice: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_manual_mapping(
        &self,
        counterparty_name: &str,
    ) -> Result<Option<ManualMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_manual_mapping"])
            .start_timer();

        let mapping = sqlx::query_as::<_, ManualMapping>(
            "SELECT mapping_id, counterparty_name, posting_account_number, created_utc \
             FROM manual_mappings WHERE counterparty_name = $1",
        )
        .bind(counterparty_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get mapping: {}", e)))?;

        timer.observe_duration();
        Ok(mapping)
    }

    #[instrument(skip(self))]
    async fn list_manual_mappings(&self) -> Result<Vec<ManualMapping>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_manual_mappings"])
            .start_timer();

        let mappings = sqlx::query_as::<_, ManualMapping>(
            "SELECT mapping_id, counterparty_name, posting_account_number, created_utc \
             FROM manual_mappings ORDER BY counterparty_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list mappings: {}", e)))?;

        timer.observe_duration();
        Ok(mappings)
    }

    #[instrument(skip(self))]
    async fn create_manual_mapping(
        &self,
        counterparty_name: &str,
        number: i64,
    ) -> Result<ManualMapping, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_manual_mapping"])
            .start_timer();

        let mapping = sqlx::query_as::<_, ManualMapping>(
            "INSERT INTO manual_mappings (mapping_id, counterparty_name, posting_account_number) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (counterparty_name) \
             DO UPDATE SET posting_account_number = EXCLUDED.posting_account_number \
             RETURNING mapping_id, counterparty_name, posting_account_number, created_utc",
        )
        .bind(Uuid::new_v4())
        .bind(counterparty_name)
        .bind(number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create mapping: {}", e))
        })?;

        timer.observe_duration();
        info!(counterparty = %counterparty_name, number = number, "Manual mapping created");
        Ok(mapping)
    }

    #[instrument(skip(self))]
    async fn delete_manual_mapping(&self, counterparty_name: &str) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_manual_mapping"])
            .start_timer();

        sqlx::query("DELETE FROM manual_mappings WHERE counterparty_name = $1")
            .bind(counterparty_name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete mapping: {}", e))
            })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_exceptions(&self) -> Result<Vec<CounterpartyException>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_exceptions"])
            .start_timer();

        let exceptions = sqlx::query_as::<_, CounterpartyException>(
            "SELECT exception_id, counterparty_name, created_utc \
             FROM counterparty_exceptions ORDER BY counterparty_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list exceptions: {}", e))
        })?;

        timer.observe_duration();
        Ok(exceptions)
    }

    #[instrument(skip(self))]
    async fn create_exception(
        &self,
        counterparty_name: &str,
    ) -> Result<CounterpartyException, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_exception"])
            .start_timer();

        let exception = sqlx::query_as::<_, CounterpartyException>(
            "INSERT INTO counterparty_exceptions (exception_id, counterparty_name) \
             VALUES ($1, $2) \
             ON CONFLICT (counterparty_name) DO UPDATE SET counterparty_name = EXCLUDED.counterparty_name \
             RETURNING exception_id, counterparty_name, created_utc",
        )
        .bind(Uuid::new_v4())
        .bind(counterparty_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create exception: {}", e))
        })?;

        timer.observe_duration();
        Ok(exception)
    }

    #[instrument(skip(self))]
    async fn delete_exception(&self, counterparty_name: &str) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_exception"])
            .start_timer();

        sqlx::query("DELETE FROM counterparty_exceptions WHERE counterparty_name = $1")
            .bind(counterparty_name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete exception: {}", e))
            })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_unmatched_counterparties(&self) -> Result<Vec<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unmatched_counterparties"])
            .start_timer();

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT counterparty_name FROM cached_invoices \
             WHERE posting_account_number = 0 AND counterparty_name IS NOT NULL \
               AND counterparty_name NOT IN (SELECT counterparty_name FROM manual_mappings) \
               AND counterparty_name NOT IN \
                   (SELECT counterparty_name FROM counterparty_exceptions) \
             ORDER BY counterparty_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to list unmatched counterparties: {}",
                e
            ))
        })?;

        timer.observe_duration();
        Ok(names)
    }
}
