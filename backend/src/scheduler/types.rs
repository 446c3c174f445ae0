use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::history::{ReconcileError, ReconcileReport, Reconciler};
use crate::market::collector::Collector;
use crate::market::meteora::{FetchError, PairListing};
use crate::market::types::Snapshot;

/// Produces one snapshot per call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn collect(&self) -> Result<Snapshot, FetchError>;
}

/// Durably stores one snapshot per call.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn reconcile(&self, snapshot: &Snapshot) -> Result<ReconcileReport, ReconcileError>;
}

#[async_trait]
impl<L: PairListing + 'static> SnapshotSource for Collector<L> {
    async fn collect(&self) -> Result<Snapshot, FetchError> {
        Collector::collect(self).await
    }
}

#[async_trait]
impl SnapshotSink for Reconciler {
    async fn reconcile(&self, snapshot: &Snapshot) -> Result<ReconcileReport, ReconcileError> {
        Reconciler::reconcile(self, snapshot).await
    }
}

#[derive(Error, Debug)]
pub enum TickError {
    #[error("collection failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
}

/// Last-tick metadata, readable while the loop runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStatus {
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    /// Capture time of the last committed tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
