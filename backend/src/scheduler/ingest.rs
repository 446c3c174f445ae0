//! Ingestion loop.
//!
//! One tick = one collection followed by one reconciliation. Ticks run
//! sequentially on a single task, so there is never more than one writer
//! and a slow tick delays the next one instead of overlapping it.
//!
//! Cancellation is observed only between ticks: a tick that has started is
//! allowed to commit or fail on its own.

use std::sync::Arc;
use std::time::Duration;

use common::logger::{TraceId, tick_span};
use parking_lot::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, field, info};

use crate::history::{ReconcileOutcome, ReconcileReport};
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::scheduler::types::{SnapshotSink, SnapshotSource, TickError, TickStatus};

pub struct IngestScheduler<S, K> {
    source: Arc<S>,
    sink: Arc<K>,
    tick_interval: Duration,
    status: Arc<RwLock<TickStatus>>,
    counters: Counters,
}

impl<S: SnapshotSource, K: SnapshotSink> IngestScheduler<S, K> {
    pub fn new(source: Arc<S>, sink: Arc<K>, tick_interval: Duration, counters: Counters) -> Self {
        Self {
            source,
            sink,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            status: Arc::new(RwLock::new(TickStatus::default())),
            counters,
        }
    }

    pub fn status(&self) -> TickStatus {
        self.status.read().clone()
    }

    /// Runs a single tick. Failures are recorded in the status and returned;
    /// nothing is retried here.
    pub async fn run_once(&self) -> Result<ReconcileReport, TickError> {
        let trace_id = TraceId::default();

        async {
            let result = self.tick().await;

            match &result {
                Ok(report) => {
                    Counters::incr(&self.counters.ticks_ok);
                    let mut st = self.status.write();
                    st.ticks_completed += 1;
                    if report.outcome == ReconcileOutcome::Committed {
                        st.last_tick_at = Some(report.captured_at);
                    }
                    st.last_error = None;
                }
                Err(e) => {
                    Counters::incr(&self.counters.ticks_failed);
                    error!(error = %e, "tick failed");
                    let mut st = self.status.write();
                    st.ticks_failed += 1;
                    st.last_error = Some(e.to_string());
                }
            }

            result
        }
        .instrument(tick_span(&trace_id))
        .await
    }

    async fn tick(&self) -> Result<ReconcileReport, TickError> {
        let snapshot = warn_if_slow("collect", self.tick_interval / 2, self.source.collect()).await?;

        let span = Span::current();
        span.record("captured_at", field::display(snapshot.captured_at));
        span.record("pools", snapshot.records.len());

        let report = self.sink.reconcile(&snapshot).await?;

        info!(
            outcome = ?report.outcome,
            sampled = report.pools_sampled,
            created = report.pools_created,
            skipped = report.records_skipped,
            anomalies = report.anomalies,
            "tick committed"
        );

        Ok(report)
    }

    /// Ticks immediately, then every `tick_interval`, until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            every_secs = self.tick_interval.as_secs(),
            "ingest scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Already logged and recorded in the status.
            let _ = self.run_once().await;
        }

        info!("ingest scheduler stopped");
    }
}
