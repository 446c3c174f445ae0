pub mod api;
pub mod client;
pub mod errors;
pub mod rate_limit;
pub mod types;

pub use api::{PageTransport, PairListing};
pub use client::MeteoraClient;
pub use errors::{FetchError, MeteoraError};
pub use rate_limit::{BackoffPolicy, RateLimitConfig, RateLimitedClient};
pub use types::*;
