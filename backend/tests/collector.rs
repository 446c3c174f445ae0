use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use dlmm_backend::market::collector::{Collector, CollectorConfig};
use dlmm_backend::market::meteora::{FetchError, MeteoraError, PageQuery, PairListing};
use dlmm_backend::market::types::{PairRecord, WindowFigures};

/// Serves canned pages and records which ones were requested.
#[derive(Default)]
struct CannedListing {
    pages: HashMap<u32, Vec<PairRecord>>,
    fail_page: Option<u32>,
    requested: Mutex<Vec<u32>>,
}

impl CannedListing {
    fn with_pages(pages: Vec<Vec<PairRecord>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, p)| (i as u32, p))
                .collect(),
            ..Default::default()
        }
    }

    fn requested(&self) -> Vec<u32> {
        let mut v = self.requested.lock().clone();
        v.sort_unstable();
        v
    }
}

#[async_trait]
impl PairListing for CannedListing {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<PairRecord>, FetchError> {
        self.requested.lock().push(query.page);

        if self.fail_page == Some(query.page) {
            return Err(FetchError::Rejected {
                page: query.page,
                source: MeteoraError::InvalidResponse("garbled body".into()),
            });
        }

        Ok(self.pages.get(&query.page).cloned().unwrap_or_default())
    }
}

fn pool(address: &str, volume_30m: f64) -> PairRecord {
    PairRecord {
        address: Some(address.into()),
        name: Some(format!("{address}-USDC")),
        volume: Some(WindowFigures {
            min_30: Some(volume_30m),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn collector(listing: &Arc<CannedListing>, batch_size: u32) -> Collector<CannedListing> {
    Collector::new(
        Arc::clone(listing),
        CollectorConfig {
            page_size: 2,
            batch_size,
            max_pages: 50,
        },
    )
}

fn addresses(records: &[PairRecord]) -> Vec<&str> {
    records.iter().filter_map(|r| r.address.as_deref()).collect()
}

#[tokio::test]
async fn stops_after_page_with_idle_pool_without_requesting_more() {
    let listing = Arc::new(CannedListing::with_pages(vec![
        vec![pool("A", 900.0), pool("B", 500.0)],
        vec![pool("C", 10.0), pool("D", 0.0)],
        vec![pool("E", 0.0), pool("F", 0.0)],
    ]));

    let snap = collector(&listing, 1).collect().await.unwrap();

    assert_eq!(addresses(&snap.records), vec!["A", "B", "C", "D"]);
    assert_eq!(listing.requested(), vec![0, 1]);
}

#[tokio::test]
async fn whole_batch_is_kept_when_tail_is_found_mid_batch() {
    let listing = Arc::new(CannedListing::with_pages(vec![
        vec![pool("A", 900.0), pool("B", 0.0)],
        vec![pool("C", 0.0), pool("D", 0.0)],
        vec![pool("E", 0.0)],
    ]));

    let snap = collector(&listing, 2).collect().await.unwrap();

    assert_eq!(addresses(&snap.records), vec!["A", "B", "C", "D"]);
    assert_eq!(listing.requested(), vec![0, 1]);
}

#[tokio::test]
async fn empty_page_ends_collection() {
    let listing = Arc::new(CannedListing::with_pages(vec![
        vec![pool("A", 900.0), pool("B", 500.0)],
        vec![pool("C", 100.0)],
    ]));

    let snap = collector(&listing, 1).collect().await.unwrap();

    assert_eq!(addresses(&snap.records), vec!["A", "B", "C"]);
    assert_eq!(listing.requested(), vec![0, 1, 2]);
}

#[tokio::test]
async fn page_cap_ends_collection() {
    let listing = Arc::new(CannedListing::with_pages(
        (0..10)
            .map(|i| vec![pool(&format!("P{i}"), 100.0)])
            .collect(),
    ));

    let c = Collector::new(
        Arc::clone(&listing),
        CollectorConfig {
            page_size: 1,
            batch_size: 2,
            max_pages: 3,
        },
    );
    let snap = c.collect().await.unwrap();

    assert_eq!(snap.records.len(), 3);
    assert_eq!(listing.requested(), vec![0, 1, 2]);
}

#[tokio::test]
async fn records_repeated_across_pages_are_kept_once() {
    // The listing shifted between requests: B appears on both pages.
    let listing = Arc::new(CannedListing::with_pages(vec![
        vec![pool("A", 900.0), pool("B", 500.0)],
        vec![pool("B", 500.0), pool("C", 0.0)],
    ]));

    let snap = collector(&listing, 1).collect().await.unwrap();

    assert_eq!(addresses(&snap.records), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn a_failed_page_fails_the_whole_run() {
    let mut listing = CannedListing::with_pages(vec![
        vec![pool("A", 900.0), pool("B", 500.0)],
        vec![pool("C", 300.0), pool("D", 200.0)],
        vec![pool("E", 0.0)],
    ]);
    listing.fail_page = Some(1);
    let listing = Arc::new(listing);

    let err = collector(&listing, 1).collect().await.unwrap_err();

    assert_eq!(err.page(), 1);
    assert!(matches!(err, FetchError::Rejected { .. }));
}

#[tokio::test]
async fn every_record_shares_one_capture_time() {
    let listing = Arc::new(CannedListing::with_pages(vec![
        vec![pool("A", 900.0)],
        vec![pool("B", 0.0)],
    ]));

    let before = chrono::Utc::now();
    let snap = collector(&listing, 1).collect().await.unwrap();

    assert!(snap.captured_at >= before);
    assert_eq!(snap.records.len(), 2);
}
