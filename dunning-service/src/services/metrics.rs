//! Prometheus metrics for dunning-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for sync cycles by outcome.
pub static SYNC_CYCLES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dunning_sync_cycles_total",
        "Total number of sync cycles",
        &["status"]
    )
    .expect("Failed to register SYNC_CYCLES")
});

/// Histogram for sync cycle duration.
pub static SYNC_CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "dunning_sync_cycle_duration_seconds",
        "Sync cycle duration in seconds",
        &["status"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("Failed to register SYNC_CYCLE_DURATION")
});

/// Counter for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "dunning_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for reconciled records by kind and outcome.
pub static RECORDS_PROCESSED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dunning_records_processed_total",
        "Total number of reconciled records",
        &["kind", "outcome"]
    )
    .expect("Failed to register RECORDS_PROCESSED")
});

/// Counter for upstream API pages fetched.
pub static UPSTREAM_PAGES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dunning_upstream_pages_total",
        "Total number of upstream pages fetched",
        &["resource", "status"]
    )
    .expect("Failed to register UPSTREAM_PAGES")
});

/// Counter for invoice-to-customer matches.
pub static INVOICE_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dunning_invoice_matches_total",
        "Total number of invoice-to-customer matches",
        &["match_type"]
    )
    .expect("Failed to register INVOICE_MATCHES")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dunning_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_CYCLES);
    Lazy::force(&SYNC_CYCLE_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&RECORDS_PROCESSED);
    Lazy::force(&UPSTREAM_PAGES);
    Lazy::force(&INVOICE_MATCHES);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a completed sync cycle.
pub fn record_sync_cycle(status: &str, duration_secs: f64) {
    SYNC_CYCLES.with_label_values(&[status]).inc();
    SYNC_CYCLE_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record a reconciled record.
pub fn record_processed(kind: &str, outcome: &str) {
    RECORDS_PROCESSED.with_label_values(&[kind, outcome]).inc();
}

/// Record an upstream page fetch.
pub fn record_upstream_page(resource: &str, status: &str) {
    UPSTREAM_PAGES.with_label_values(&[resource, status]).inc();
}

/// Record an invoice-to-customer match.
pub fn record_invoice_match(match_type: &str) {
    INVOICE_MATCHES.with_label_values(&[match_type]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
