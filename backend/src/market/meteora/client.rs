use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::market::meteora::api::PageTransport;
use crate::market::meteora::errors::MeteoraError;
use crate::market::meteora::types::{PageQuery, PairPage};

const LISTING_PATH: &str = "/pair/all_with_pagination";

// The collector's stop condition relies on this ordering.
const ORDER_BY: &str = "desc";
const SORT_KEY: &str = "volume";

#[derive(Clone)]
pub struct MeteoraClient {
    http: Client,
    url: String,
}

impl MeteoraClient {
    /// `timeout` bounds every request independently of any retry policy.
    pub fn new(url: String, timeout: Duration) -> Result<Self, MeteoraError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PageTransport for MeteoraClient {
    #[instrument(
        skip(self),
        fields(page = query.page, limit = query.limit),
        level = "debug"
    )]
    async fn get_page(&self, query: &PageQuery) -> Result<PairPage, MeteoraError> {
        let url = format!("{}{}", self.url, LISTING_PATH);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("page", query.page.to_string()),
                ("limit", query.limit.to_string()),
                ("order_by", ORDER_BY.to_string()),
                ("sort_key", SORT_KEY.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MeteoraError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body: Value = resp.json().await?;
        let page = PairPage::from_value(body)?;

        debug!(
            records = page.records.len(),
            total = ?page.total,
            "meteora page fetched"
        );

        Ok(page)
    }
}
