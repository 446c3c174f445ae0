use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use dlmm_backend::history::{ReconcileError, ReconcileReport};
use dlmm_backend::market::meteora::{FetchError, MeteoraError};
use dlmm_backend::market::types::{PairRecord, Snapshot};
use dlmm_backend::metrics::counters::Counters;
use dlmm_backend::scheduler::{IngestScheduler, SnapshotSink, SnapshotSource, TickError};

const TICK: Duration = Duration::from_secs(60);

/// Source whose collections take `latency` and fail on the listed calls.
#[derive(Default)]
struct FakeSource {
    latency: Duration,
    fail_calls: Vec<usize>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl SnapshotSource for FakeSource {
    async fn collect(&self) -> Result<Snapshot, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_calls.contains(&call) {
            return Err(FetchError::Exhausted {
                page: 0,
                attempts: 5,
                source: MeteoraError::Status {
                    status: 429,
                    url: "http://listing".into(),
                },
            });
        }

        Ok(Snapshot {
            records: vec![PairRecord {
                address: Some(format!("Pool{call}")),
                ..Default::default()
            }],
            captured_at: Utc::now(),
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    stored: Mutex<Vec<Snapshot>>,
}

#[async_trait]
impl SnapshotSink for RecordingSink {
    async fn reconcile(&self, snapshot: &Snapshot) -> Result<ReconcileReport, ReconcileError> {
        self.stored.lock().push(snapshot.clone());
        let mut report = ReconcileReport::new(snapshot.captured_at);
        report.pools_sampled = snapshot.records.len();
        Ok(report)
    }
}

fn scheduler(
    source: FakeSource,
) -> (
    Arc<IngestScheduler<FakeSource, RecordingSink>>,
    Arc<FakeSource>,
    Arc<RecordingSink>,
    Counters,
) {
    let source = Arc::new(source);
    let sink = Arc::new(RecordingSink::default());
    let counters = Counters::default();
    let sched = Arc::new(IngestScheduler::new(
        Arc::clone(&source),
        Arc::clone(&sink),
        TICK,
        counters.clone(),
    ));
    (sched, source, sink, counters)
}

#[tokio::test(start_paused = true)]
async fn ticks_immediately_then_every_interval() {
    let (sched, source, sink, counters) = scheduler(FakeSource::default());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&sched).run(cancel.clone()));

    // Ticks at 0s, 60s and 120s.
    tokio::time::sleep(Duration::from_secs(150)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(sink.stored.lock().len(), 3);
    assert_eq!(Counters::read(&counters.ticks_ok), 3);

    let status = sched.status();
    assert_eq!(status.ticks_completed, 3);
    assert!(status.last_tick_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_tick_is_recorded_and_loop_continues() {
    let (sched, source, sink, counters) = scheduler(FakeSource {
        fail_calls: vec![0],
        ..Default::default()
    });
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&sched).run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(30)).await;
    let after_failure = sched.status();
    assert_eq!(after_failure.ticks_failed, 1);
    assert!(after_failure.last_error.is_some());
    assert!(sink.stored.lock().is_empty());

    tokio::time::sleep(Duration::from_secs(100)).await;
    cancel.cancel();
    handle.await.unwrap();

    let status = sched.status();
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(status.ticks_failed, 1);
    assert_eq!(status.ticks_completed, 2);
    assert_eq!(status.last_error, None);
    assert_eq!(Counters::read(&counters.ticks_failed), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_ticks_never_overlap() {
    let (sched, source, sink, _) = scheduler(FakeSource {
        latency: Duration::from_secs(90),
        ..Default::default()
    });
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&sched).run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(400)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(source.calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(sink.stored.lock().len(), source.calls.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_the_in_flight_tick_finish() {
    let (sched, source, sink, _) = scheduler(FakeSource {
        latency: Duration::from_secs(30),
        ..Default::default()
    });
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&sched).run(cancel.clone()));

    // Mid-collection.
    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.stored.lock().len(), 1);
    assert_eq!(sched.status().ticks_completed, 1);
}

#[tokio::test]
async fn run_once_surfaces_the_failure() {
    let (sched, _, _, _) = scheduler(FakeSource {
        fail_calls: vec![0],
        ..Default::default()
    });

    let err = sched.run_once().await.unwrap_err();
    assert!(matches!(err, TickError::Fetch(FetchError::Exhausted { .. })));

    let report = sched.run_once().await.unwrap();
    assert_eq!(report.pools_sampled, 1);
}
