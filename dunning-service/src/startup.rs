//! Application startup and lifecycle management.

use crate::config::DunningConfig;
use crate::models::SyncSummary;
use crate::services::{
    get_metrics, init_metrics, Database, ReconciliationStore, SyncService, UpstreamClient,
};
use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DunningConfig,
    pub db: Arc<Database>,
    pub sync: Arc<SyncService>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "dunning-service",
                    "version": env!("CARGO_PKG_VERSION"),
                    "sync_phase": state.sync.phase().as_str()
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "dunning-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Manual sync trigger. Responds 409 while a cycle is already running.
async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncSummary>, AppError> {
    let summary = state.sync.run_cycle().await?;
    Ok(Json(summary))
}

/// Dunning assessments for every invoice linked to a customer number,
/// computed at read time with the configured defaults.
async fn dunning_handler(
    State(state): State<AppState>,
    axum::extract::Path(number): axum::extract::Path<i64>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    if state.db.get_customer_by_number(number).await?.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "no customer with number {}",
            number
        )));
    }

    let rules = crate::models::DunningRuleSet {
        stages: crate::services::dunning::default_stages(),
        interest: crate::models::InterestPolicy::LegalRate,
    };
    let today = chrono::Utc::now().date_naive();

    let assessments = state
        .db
        .list_invoices_for_customer(number)
        .await?
        .iter()
        .map(|invoice| {
            let assessment = crate::services::dunning::assess(
                invoice,
                Some(&rules),
                state.config.dunning.payment_term_days,
                state.config.dunning.legal_rate_percent,
                today,
            );
            json!({
                "external_id": invoice.external_id,
                "invoice_number": invoice.invoice_number,
                "open_amount": invoice.open_amount,
                "assessment": assessment,
            })
        })
        .collect();

    Ok(Json(assessments))
}

/// Counterparty names on unlinked invoices with no mapping or exception.
async fn unmatched_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let names = state.db.list_unmatched_counterparties().await?;
    Ok(Json(names))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: DunningConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        let db = Arc::new(db);

        let upstream = Arc::new(UpstreamClient::new(
            config.upstream.base_url.clone(),
            config.upstream.token_id.clone(),
            config.upstream.token_secret.clone(),
            config.upstream.timeout_secs,
        )?);

        let sync = Arc::new(SyncService::new(
            db.clone(),
            upstream,
            config.sync.page_size,
        ));

        let state = AppState {
            config: config.clone(),
            db,
            sync,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Dunning service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route("/sync", post(sync_handler))
            .route("/sync/unmatched", get(unmatched_handler))
            .route("/customers/:number/dunning", get(dunning_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        let scheduler = spawn_scheduler(
            self.state.sync.clone(),
            self.state.config.sync.interval_secs,
            self.state.config.sync.timeout_secs,
        );

        tracing::info!(
            service = "dunning-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.listener, router).await;

        if let Some(handle) = scheduler {
            handle.abort();
        }

        result.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Run sync cycles on a fixed interval. A cycle that exceeds the timeout is
/// cancelled and marked failed; the next tick starts fresh.
fn spawn_scheduler(
    sync: Arc<SyncService>,
    interval_secs: u64,
    timeout_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Sync scheduler disabled");
        return None;
    }

    tracing::info!(interval_secs = interval_secs, "Sync scheduler started");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; an initial pull at startup is
        // what operators expect after a deploy.
        loop {
            ticker.tick().await;
            match sync
                .run_cycle_with_timeout(Duration::from_secs(timeout_secs))
                .await
            {
                Ok(summary) => {
                    if !summary.errors.is_empty() {
                        tracing::warn!(
                            errors = summary.errors.len(),
                            "Scheduled sync cycle finished with errors"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Scheduled sync cycle did not run to completion");
                }
            }
        }
    }))
}
