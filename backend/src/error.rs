use std::time::Duration;

use thiserror::Error;

/// Bootstrap and configuration failures. Runtime failures of a tick have
/// their own types (`FetchError`, `ReconcileError`) and never reach here.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid rate limit: {calls} call(s) per {period:?}")]
    InvalidRateLimit { calls: u32, period: Duration },
}
