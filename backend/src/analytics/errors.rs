use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("lookback must cover at least one tick, got {0}")]
    InvalidLookback(usize),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
