use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::analytics::YieldParams;
use crate::market::collector::CollectorConfig;
use crate::market::meteora::{BackoffPolicy, RateLimitConfig};

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// `APP_ENV=production` switches logs to JSON.
    pub production: bool,

    // =========================
    // Listing API
    // =========================
    /// Base URL of the DLMM listing API.
    pub api_url: String,

    /// Pools per listing page.
    pub page_size: u32,

    /// Hard cap on pages per collection run.
    pub max_pages: u32,

    /// Per-request timeout on the HTTP client.
    pub request_timeout: Duration,

    // =========================
    // Rate limit and retry
    // =========================
    /// At most this many calls per `rate_limit_period`. Also the number of
    /// pages requested concurrently.
    pub rate_limit_calls: u32,
    pub rate_limit_period: Duration,

    /// Attempts per page, first try included.
    pub retry_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,

    // =========================
    // Scheduler
    // =========================
    /// Cadence of ingestion ticks. Also the unit analytics scale yields by.
    pub tick_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://dlmm_history.db?mode=rwc".to_string());
        let api_url = std::env::var("METEORA_API_URL")
            .unwrap_or_else(|_| "https://dlmm-api.meteora.ag".to_string());
        let production = std::env::var("APP_ENV").unwrap_or_default() == "production";

        Self {
            database_url,
            production,
            api_url,

            page_size: env_or("PAGE_SIZE", 100),
            max_pages: env_or("MAX_PAGES", 200),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 10)),

            // 30 calls a minute, 5 attempts backing off 2s..10s.
            rate_limit_calls: env_or("RATE_LIMIT_CALLS", 30),
            rate_limit_period: Duration::from_secs(env_or("RATE_LIMIT_PERIOD_SECS", 60)),
            retry_attempts: env_or("RETRY_ATTEMPTS", 5),
            backoff_min: Duration::from_millis(env_or("BACKOFF_MIN_MS", 2_000)),
            backoff_max: Duration::from_millis(env_or("BACKOFF_MAX_MS", 10_000)),

            tick_interval: Duration::from_secs(env_or::<u64>("TICK_INTERVAL_SECS", 60).max(1)),
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            calls: self.rate_limit_calls,
            period: self.rate_limit_period,
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            min: self.backoff_min,
            max: self.backoff_max.max(self.backoff_min),
            ..BackoffPolicy::default()
        }
    }

    pub fn collector(&self) -> CollectorConfig {
        CollectorConfig {
            page_size: self.page_size.max(1),
            batch_size: self.rate_limit_calls.max(1),
            max_pages: self.max_pages.max(1),
        }
    }

    pub fn yield_params(&self) -> YieldParams {
        YieldParams::new(self.tick_interval)
    }
}

/// Reads and parses `key`, falling back to `default` when unset or invalid.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(key, value = raw, ?default, "unparseable config value; using default");
        default
    })
}
