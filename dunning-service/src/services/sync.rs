//! Sync cycle orchestration: pull, normalize, reconcile, link.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use serde_json::Value;
use service_core::error::AppError;
use tracing::{info, instrument, warn};

use crate::models::{
    payment_epsilon, CachedInvoice, ChangeOutcome, Customer, CyclePhase, NormalizedInvoice,
    SyncSummary,
};
use crate::services::changes::{classify, debtor_digest};
use crate::services::matching::best_match_index;
use crate::services::metrics;
use crate::services::normalize::{extract_debtor_number, normalize_debtor, normalize_invoice};
use crate::services::store::ReconciliationStore;
use crate::services::upstream::UpstreamApi;

/// Runs full reconciliation cycles against the upstream API.
///
/// At most one cycle runs at a time; a trigger that arrives while a cycle is
/// in flight is rejected rather than queued, since cycles are idempotent and
/// the next one picks up whatever the rejected trigger would have.
pub struct SyncService {
    store: Arc<dyn ReconciliationStore>,
    upstream: Arc<dyn UpstreamApi>,
    page_size: u64,
    busy: tokio::sync::Mutex<()>,
    phase: std::sync::Mutex<CyclePhase>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        upstream: Arc<dyn UpstreamApi>,
        page_size: u64,
    ) -> Self {
        Self {
            store,
            upstream,
            page_size: page_size.max(1),
            busy: tokio::sync::Mutex::new(()),
            phase: std::sync::Mutex::new(CyclePhase::Done),
        }
    }

    /// Phase of the cycle currently (or last) running.
    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    /// Run one full cycle. Returns `Conflict` if a cycle is already running.
    ///
    /// Per-record failures are accumulated into the summary and do not stop
    /// the cycle; an upstream or store failure aborts it, keeping whatever
    /// rows were already committed.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<SyncSummary, AppError> {
        let _guard = self
            .busy
            .try_lock()
            .map_err(|_| AppError::Conflict(anyhow!("a sync cycle is already running")))?;

        let start = Instant::now();
        let mut summary = SyncSummary::default();

        match self.cycle(&mut summary).await {
            Ok(()) => {
                self.set_phase(CyclePhase::Done);
                metrics::record_sync_cycle("ok", start.elapsed().as_secs_f64());
                info!(
                    pulled = summary.pulled,
                    created = summary.created,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    errors = summary.errors.len(),
                    "Sync cycle completed"
                );
            }
            Err(e) => {
                self.set_phase(CyclePhase::Failed);
                metrics::record_sync_cycle("failed", start.elapsed().as_secs_f64());
                metrics::record_error("cycle_aborted");
                warn!(error = %e, "Sync cycle aborted");
                summary.errors.push(format!("cycle aborted: {}", e));
            }
        }

        Ok(summary)
    }

    /// Run one cycle with a hard time limit. A cycle that outlives the limit
    /// is cancelled at its next await point and marked failed; pages committed
    /// before the cancellation remain committed.
    pub async fn run_cycle_with_timeout(
        &self,
        limit: std::time::Duration,
    ) -> Result<SyncSummary, AppError> {
        match tokio::time::timeout(limit, self.run_cycle()).await {
            Ok(result) => result,
            Err(_) => {
                self.set_phase(CyclePhase::Failed);
                metrics::record_sync_cycle("timeout", limit.as_secs_f64());
                metrics::record_error("cycle_timeout");
                warn!(limit_secs = limit.as_secs(), "Sync cycle timed out");
                Err(AppError::InternalError(anyhow!(
                    "sync cycle exceeded {}s and was cancelled",
                    limit.as_secs()
                )))
            }
        }
    }

    async fn cycle(&self, summary: &mut SyncSummary) -> Result<(), AppError> {
        self.reconcile_debtors(summary).await?;
        self.reconcile_invoices(summary).await?;

        self.set_phase(CyclePhase::Linking);
        self.link_unlinked_invoices(summary).await?;

        Ok(())
    }

    async fn fetch_page(&self, resource: &str, offset: u64) -> Result<Vec<Value>, AppError> {
        let page = match resource {
            "debtors" => self.upstream.fetch_debtors(offset, self.page_size).await,
            _ => self.upstream.fetch_invoices(offset, self.page_size).await,
        };
        match page {
            Ok(p) => {
                metrics::record_upstream_page(resource, "ok");
                Ok(p)
            }
            Err(e) => {
                metrics::record_upstream_page(resource, "error");
                Err(e)
            }
        }
    }

    /// Upsert debtors keyed by posting-account number, adopting placeholder
    /// customers by name match instead of creating duplicates. Every page is
    /// committed before the next one is requested, so an aborted cycle keeps
    /// the pages that already landed.
    async fn reconcile_debtors(&self, summary: &mut SyncSummary) -> Result<(), AppError> {
        // Placeholder customers not yet claimed this cycle. Each may adopt
        // at most one upstream debtor.
        let mut placeholders: Vec<_> = self
            .store
            .list_customers()
            .await?
            .into_iter()
            .filter(|c| c.is_placeholder())
            .collect();
        let mut seen_numbers: HashSet<i64> = HashSet::new();
        let mut offset = 0u64;

        loop {
            self.set_phase(CyclePhase::Fetching);
            let page = self.fetch_page("debtors", offset).await?;
            let count = page.len() as u64;
            summary.pulled += count;

            self.set_phase(CyclePhase::Normalizing);
            for payload in &page {
                self.reconcile_debtor(payload, &mut placeholders, &mut seen_numbers, summary)
                    .await;
            }

            if count < self.page_size {
                return Ok(());
            }
            offset += count;
        }
    }

    async fn reconcile_debtor(
        &self,
        payload: &Value,
        placeholders: &mut Vec<Customer>,
        seen_numbers: &mut HashSet<i64>,
        summary: &mut SyncSummary,
    ) {
        let debtor = match normalize_debtor(payload) {
            Ok(Some(d)) => d,
            Ok(None) => return,
            Err(e) => {
                metrics::record_error("debtor_normalize");
                summary.errors.push(format!("debtor: {}", e));
                return;
            }
        };

        if !seen_numbers.insert(debtor.posting_account_number) {
            summary.errors.push(format!(
                "debtor {}: duplicate posting-account number in pull",
                debtor.posting_account_number
            ));
            return;
        }

        let digest = debtor_digest(&debtor);

        let existing = match self
            .store
            .get_customer_by_number(debtor.posting_account_number)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                metrics::record_error("debtor_store");
                summary
                    .errors
                    .push(format!("debtor {}: {}", debtor.posting_account_number, e));
                return;
            }
        };

        let result: Result<&'static str, AppError> = match existing {
            Some(customer) => match classify(&digest, customer.last_sync_hash.as_deref()) {
                ChangeOutcome::Unchanged => Ok("unchanged"),
                ChangeOutcome::Updated => self
                    .store
                    .update_customer(customer.customer_id, &debtor, &digest)
                    .await
                    .map(|_| "updated"),
                // The digest is persisted so the next cycle can tell
                // real changes apart, but a first observation is not
                // an update.
                ChangeOutcome::FirstSeen => self
                    .store
                    .update_customer(customer.customer_id, &debtor, &digest)
                    .await
                    .map(|_| "first_seen"),
            },
            None => {
                let adopted = best_match_index(
                    &debtor.name,
                    placeholders.iter().map(|c| c.name.as_str()),
                );
                match adopted {
                    Some(idx) => {
                        let placeholder = placeholders.remove(idx);
                        self.store
                            .renumber_customer(
                                placeholder.customer_id,
                                placeholder.posting_account_number,
                                debtor.posting_account_number,
                                &debtor,
                                &digest,
                            )
                            .await
                            .map(|_| "renumbered")
                    }
                    None => self
                        .store
                        .create_customer(debtor.posting_account_number, &debtor, Some(&digest))
                        .await
                        .map(|_| "created"),
                }
            }
        };

        match result {
            Ok(outcome) => {
                match outcome {
                    "created" => summary.created += 1,
                    "updated" | "renumbered" => summary.updated += 1,
                    _ => summary.unchanged += 1,
                }
                metrics::record_processed("debtor", outcome);
            }
            Err(e) => {
                metrics::record_error("debtor_store");
                summary
                    .errors
                    .push(format!("debtor {}: {}", debtor.posting_account_number, e));
            }
        }
    }

    /// Upsert invoices keyed by external id, page by page. Cached rows are
    /// rewritten only when a materially relevant field changed.
    async fn reconcile_invoices(&self, summary: &mut SyncSummary) -> Result<(), AppError> {
        let mut offset = 0u64;

        loop {
            self.set_phase(CyclePhase::Fetching);
            let page = self.fetch_page("invoices", offset).await?;
            let count = page.len() as u64;
            summary.pulled += count;

            self.set_phase(CyclePhase::Persisting);
            for payload in &page {
                self.reconcile_invoice(payload, summary).await;
            }

            if count < self.page_size {
                return Ok(());
            }
            offset += count;
        }
    }

    async fn reconcile_invoice(&self, payload: &Value, summary: &mut SyncSummary) {
        let mut record = match normalize_invoice(payload) {
            Ok(Some(r)) => r,
            Ok(None) => return,
            Err(e) => {
                metrics::record_error("invoice_normalize");
                summary.errors.push(format!("invoice: {}", e));
                return;
            }
        };

        let existing = match self.store.get_invoice_by_external_id(&record.external_id).await {
            Ok(i) => i,
            Err(e) => {
                metrics::record_error("invoice_store");
                summary
                    .errors
                    .push(format!("invoice {}: {}", record.external_id, e));
                return;
            }
        };

        let result: Result<&'static str, AppError> = match existing {
            Some(cached) => {
                // A link established locally survives re-pulls that carry
                // no debtor number.
                if record.posting_account_number == 0 && cached.is_linked() {
                    record.posting_account_number = cached.posting_account_number;
                }
                if invoice_differs(&cached, &record) {
                    self.store
                        .update_invoice(&record.external_id, &record)
                        .await
                        .map(|_| "updated")
                } else {
                    Ok("unchanged")
                }
            }
            None => self.store.insert_invoice(&record).await.map(|_| "created"),
        };

        match result {
            Ok(outcome) => {
                match outcome {
                    "created" => summary.created += 1,
                    "updated" => summary.updated += 1,
                    _ => summary.unchanged += 1,
                }
                metrics::record_processed("invoice", outcome);
            }
            Err(e) => {
                metrics::record_error("invoice_store");
                summary
                    .errors
                    .push(format!("invoice {}: {}", record.external_id, e));
            }
        }
    }

    /// Resolve still-unlinked invoices: payload debtor number first, then
    /// manual mapping, then fuzzy counterparty match. Exceptions only mute
    /// unmatched-name reporting; they never influence linking.
    async fn link_unlinked_invoices(&self, summary: &mut SyncSummary) -> Result<(), AppError> {
        let unlinked = self.store.list_unlinked_invoices().await?;
        if unlinked.is_empty() {
            return Ok(());
        }

        let customers = self.store.list_customers().await?;

        for invoice in unlinked {
            match self.resolve_link(&invoice, &customers).await {
                Ok(Some((number, match_type))) => {
                    metrics::record_invoice_match(match_type);
                    if let Err(e) = self.store.link_invoice(&invoice.external_id, number).await {
                        metrics::record_error("invoice_store");
                        summary
                            .errors
                            .push(format!("link {}: {}", invoice.external_id, e));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    metrics::record_error("invoice_store");
                    summary
                        .errors
                        .push(format!("link {}: {}", invoice.external_id, e));
                }
            }
        }

        Ok(())
    }

    async fn resolve_link(
        &self,
        invoice: &CachedInvoice,
        customers: &[Customer],
    ) -> Result<Option<(i64, &'static str)>, AppError> {
        let number = extract_debtor_number(&invoice.raw_payload);
        if number > 0 && customers.iter().any(|c| c.posting_account_number == number) {
            return Ok(Some((number, "payload")));
        }

        let Some(name) = invoice.counterparty_name.as_deref() else {
            return Ok(None);
        };

        if let Some(mapping) = self.store.get_manual_mapping(name).await? {
            return Ok(Some((mapping.posting_account_number, "manual")));
        }

        let matched = best_match_index(name, customers.iter().map(|c| c.name.as_str()));
        Ok(matched.map(|idx| (customers[idx].posting_account_number, "fuzzy")))
    }
}

/// True when a re-pulled record differs from the cached row in a field the
/// cycle cares about. Open amounts within the payment epsilon are equal.
pub fn invoice_differs(cached: &CachedInvoice, record: &NormalizedInvoice) -> bool {
    cached.invoice_number != record.invoice_number
        || cached.counterparty_name != record.counterparty_name
        || cached.due_date != record.due_date
        || (cached.open_amount - record.open_amount).abs() >= payment_epsilon()
        || cached.payment_status != record.payment_status.as_str()
        || cached.posting_account_number != record.posting_account_number
}
