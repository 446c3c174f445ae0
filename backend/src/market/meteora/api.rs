use async_trait::async_trait;

use crate::market::meteora::errors::{FetchError, MeteoraError};
use crate::market::meteora::types::{PageQuery, PairPage};
use crate::market::types::PairRecord;

/// A single raw call against the listing endpoint. No retries, no pacing.
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn get_page(&self, query: &PageQuery) -> Result<PairPage, MeteoraError>;
}

/// Page access as the collector sees it: paced and retried.
#[async_trait]
pub trait PairListing: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<PairRecord>, FetchError>;
}
