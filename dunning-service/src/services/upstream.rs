//! HTTP client for the upstream accounting API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use service_core::error::AppError;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Tokens are refreshed this many seconds before their reported expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Read access to the upstream accounting API, one page at a time.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Fetch a page of debtor records. An empty page means the end of the set.
    async fn fetch_debtors(&self, offset: u64, limit: u64) -> Result<Vec<Value>, AppError>;

    /// Fetch a page of outgoing invoice records.
    async fn fetch_invoices(&self, offset: u64, limit: u64) -> Result<Vec<Value>, AppError>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Token-authenticated client for the upstream accounting API.
///
/// The bearer token is cached and refreshed lazily shortly before expiry,
/// so concurrent callers share one login round trip.
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    token_id: String,
    token_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl UpstreamClient {
    pub fn new(
        base_url: String,
        token_id: String,
        token_secret: String,
        timeout_secs: u64,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                AppError::UpstreamError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_id,
            token_secret,
            cached: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String, AppError> {
        let mut guard = self.cached.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let login = self.login().await?;
        let expires_at =
            Utc::now() + Duration::seconds((login.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0));
        let token = login.token.clone();
        *guard = Some(CachedToken {
            token: login.token,
            expires_at,
        });

        Ok(token)
    }

    #[instrument(skip(self))]
    async fn login(&self) -> Result<LoginResponse, AppError> {
        info!("Requesting upstream API token");

        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&serde_json::json!({
                "token_id": self.token_id,
                "token_secret": self.token_secret,
            }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamError(anyhow::anyhow!("Login request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(anyhow::anyhow!(
                "Login rejected with status {}",
                response.status()
            )));
        }

        response.json::<LoginResponse>().await.map_err(|e| {
            AppError::UpstreamError(anyhow::anyhow!("Malformed login response: {}", e))
        })
    }

    async fn fetch_page(
        &self,
        resource: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, AppError> {
        let token = self.bearer_token().await?;

        debug!(resource = resource, offset = offset, limit = limit, "Fetching upstream page");

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, resource))
            .bearer_auth(token)
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await
            .map_err(|e| {
                AppError::UpstreamError(anyhow::anyhow!("Failed to fetch {}: {}", resource, e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamError(anyhow::anyhow!(
                "Upstream returned status {} for {}",
                response.status(),
                resource
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::UpstreamError(anyhow::anyhow!("Malformed {} response: {}", resource, e))
        })?;

        // Responses either wrap the page in an "items" array or are a bare array.
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .or_else(|| body.as_array().cloned())
            .ok_or_else(|| {
                AppError::UpstreamError(anyhow::anyhow!(
                    "Unexpected {} response shape",
                    resource
                ))
            })?;

        Ok(items)
    }
}

#[async_trait]
impl UpstreamApi for UpstreamClient {
    async fn fetch_debtors(&self, offset: u64, limit: u64) -> Result<Vec<Value>, AppError> {
        self.fetch_page("debtors", offset, limit).await
    }

    async fn fetch_invoices(&self, offset: u64, limit: u64) -> Result<Vec<Value>, AppError> {
        self.fetch_page("outgoing-invoices", offset, limit).await
    }
}
