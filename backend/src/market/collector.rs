//! Collector
//!
//! Pages through the listing endpoint and assembles one coherent snapshot per
//! call. Pages are requested in concurrent batches sized to the rate budget;
//! the limiter inside the listing spaces consecutive batches.
//!
//! A run either returns every page it asked for or fails as a whole. Nothing
//! fetched by a failed run is ever handed to the reconciler.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use crate::market::meteora::{FetchError, PageQuery, PairListing};
use crate::market::types::{PairRecord, Snapshot};

#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// Records per page.
    pub page_size: u32,
    /// Pages requested concurrently per round (the calls-per-period budget).
    pub batch_size: u32,
    /// Hard cap on pages per run.
    pub max_pages: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            batch_size: 1,
            max_pages: 200,
        }
    }
}

pub struct Collector<L> {
    listing: Arc<L>,
    cfg: CollectorConfig,
}

impl<L: PairListing> Collector<L> {
    pub fn new(listing: Arc<L>, cfg: CollectorConfig) -> Self {
        Self { listing, cfg }
    }

    /// Pulls the current pool set.
    ///
    /// Stops after the first batch containing a pool with zero short-window
    /// volume (the listing is volume-sorted, so the active tail has been
    /// passed), on an empty page, or at `max_pages`. Repeated records are
    /// kept once, first occurrence wins.
    #[instrument(skip(self), fields(page_size = self.cfg.page_size, batch = self.cfg.batch_size))]
    pub async fn collect(&self) -> Result<Snapshot, FetchError> {
        let batch_size = self.cfg.batch_size.max(1);

        let mut records: Vec<PairRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut duplicates = 0usize;
        let mut next_page = 0u32;

        loop {
            if next_page >= self.cfg.max_pages {
                warn!(
                    max_pages = self.cfg.max_pages,
                    "page cap reached before the idle tail; snapshot may be truncated"
                );
                break;
            }

            let end = next_page.saturating_add(batch_size).min(self.cfg.max_pages);
            let queries: Vec<PageQuery> = (next_page..end)
                .map(|page| PageQuery {
                    page,
                    limit: self.cfg.page_size,
                })
                .collect();

            let pages = try_join_all(queries.iter().map(|q| self.listing.fetch_page(q))).await?;
            next_page = end;

            let mut reached_tail = false;
            let mut exhausted = false;

            for page_records in pages {
                exhausted |= page_records.is_empty();
                reached_tail |= page_records.iter().any(PairRecord::is_idle);

                for record in page_records {
                    if let Some(address) = &record.address {
                        if !seen.insert(address.clone()) {
                            duplicates += 1;
                            continue;
                        }
                    }
                    records.push(record);
                }
            }

            debug!(next_page, total = records.len(), reached_tail, exhausted, "batch collected");

            if reached_tail || exhausted {
                break;
            }
        }

        let captured_at = Utc::now();

        info!(
            pools = records.len(),
            pages = next_page,
            duplicates,
            captured_at = %captured_at,
            "snapshot collected"
        );

        Ok(Snapshot {
            records,
            captured_at,
        })
    }
}
