use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    // collection
    pub pages_fetched: Arc<AtomicU64>,
    pub fetch_retries: Arc<AtomicU64>,
    pub fetch_failures: Arc<AtomicU64>,

    // ticks
    pub ticks_ok: Arc<AtomicU64>,
    pub ticks_failed: Arc<AtomicU64>,

    // reconciliation
    pub records_skipped: Arc<AtomicU64>,
    pub records_failed: Arc<AtomicU64>,
    pub anomalies: Arc<AtomicU64>,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
