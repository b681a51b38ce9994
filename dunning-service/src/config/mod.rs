//! Configuration module for dunning-service.

use crate::models::DunningRuleSet;
use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct DunningConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub sync: SyncConfig,
    pub dunning: DunningDefaults,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub token_id: String,
    pub token_secret: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Seconds between scheduled sync cycles; 0 disables the scheduler.
    pub interval_secs: u64,
    /// Hard ceiling for one cycle before it is abandoned.
    pub timeout_secs: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone)]
pub struct DunningDefaults {
    pub payment_term_days: i64,
    /// Statutory default interest for commercial debt, percent per year.
    pub legal_rate_percent: Decimal,
}

impl DunningConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "dunning-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            upstream: UpstreamConfig {
                base_url: env::var("UPSTREAM_BASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("UPSTREAM_BASE_URL is required"))
                })?,
                token_id: env::var("UPSTREAM_TOKEN_ID").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("UPSTREAM_TOKEN_ID is required"))
                })?,
                token_secret: env::var("UPSTREAM_TOKEN_SECRET").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("UPSTREAM_TOKEN_SECRET is required"))
                })?,
                timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            sync: SyncConfig {
                interval_secs: env::var("SYNC_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
                timeout_secs: env::var("SYNC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
                page_size: env::var("SYNC_PAGE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
            },
            dunning: DunningDefaults {
                payment_term_days: env::var("DUNNING_PAYMENT_TERM_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DunningRuleSet::DEFAULT_PAYMENT_TERM_DAYS),
                legal_rate_percent: env::var("DUNNING_LEGAL_RATE_PERCENT")
                    .ok()
                    .and_then(|s| Decimal::from_str(&s).ok())
                    .unwrap_or_else(|| Decimal::new(912, 2)),
            },
        })
    }
}
