//! Pacing and retry decorator around a [`PageTransport`].
//!
//! Every attempt, retries included, draws one cell from the shared GCRA
//! budget before it goes out. Callers sharing one limiter therefore share
//! one budget: aggressive retrying by one caller delays the others.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::market::meteora::api::{PageTransport, PairListing};
use crate::market::meteora::errors::{FetchError, MeteoraError};
use crate::market::meteora::types::PageQuery;
use crate::market::types::PairRecord;
use crate::metrics::counters::Counters;

/// At most `calls` requests per rolling `period`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub calls: u32,
    pub period: Duration,
}

impl RateLimitConfig {
    pub fn quota(&self) -> Result<Quota, AppError> {
        let invalid = || AppError::InvalidRateLimit {
            calls: self.calls,
            period: self.period,
        };

        let burst = NonZeroU32::new(self.calls).ok_or_else(invalid)?;
        let quota = Quota::with_period(self.period / self.calls).ok_or_else(invalid)?;

        Ok(quota.allow_burst(burst))
    }
}

/// Exponential backoff: `multiplier * 2^n`, clamped into `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub multiplier: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            multiplier: Duration::from_secs(1),
            min: Duration::from_secs(2),
            max: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Sleeps between `attempts` tries, i.e. `attempts - 1` delays.
    pub fn delays(&self, attempts: u32) -> Vec<Duration> {
        (0..attempts.saturating_sub(1))
            .map(|n| {
                let factor = 1u32.checked_shl(n).unwrap_or(u32::MAX);
                self.multiplier
                    .saturating_mul(factor)
                    .max(self.min)
                    .min(self.max)
            })
            .collect()
    }
}

pub struct RateLimitedClient<T> {
    transport: T,
    limiter: DefaultDirectRateLimiter,
    backoff: BackoffPolicy,
    max_attempts: u32,
    counters: Counters,
}

impl<T: PageTransport> RateLimitedClient<T> {
    pub fn new(
        transport: T,
        rate: RateLimitConfig,
        backoff: BackoffPolicy,
        max_attempts: u32,
        counters: Counters,
    ) -> Result<Self, AppError> {
        Ok(Self {
            transport,
            limiter: RateLimiter::direct(rate.quota()?),
            backoff,
            max_attempts: max_attempts.max(1),
            counters,
        })
    }
}

#[async_trait]
impl<T: PageTransport> PairListing for RateLimitedClient<T> {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<PairRecord>, FetchError> {
        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;

        let result = RetryIf::spawn(
            self.backoff.delays(self.max_attempts),
            move || {
                attempts_ref.fetch_add(1, Ordering::Relaxed);
                async move {
                    self.limiter.until_ready().await;
                    self.transport.get_page(query).await
                }
            },
            move |e: &MeteoraError| {
                let retryable = e.is_retryable();
                if retryable {
                    warn!(page = query.page, error = %e, "transient meteora failure");
                }
                retryable
            },
        )
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        Counters::add(&self.counters.fetch_retries, u64::from(attempts.saturating_sub(1)));

        match result {
            Ok(page) => {
                Counters::incr(&self.counters.pages_fetched);
                debug!(page = query.page, attempts, records = page.records.len(), "page ok");
                Ok(page.records)
            }
            Err(source) => {
                Counters::incr(&self.counters.fetch_failures);
                if source.is_retryable() {
                    Err(FetchError::Exhausted {
                        page: query.page,
                        attempts,
                        source,
                    })
                } else {
                    Err(FetchError::Rejected {
                        page: query.page,
                        source,
                    })
                }
            }
        }
    }
}
