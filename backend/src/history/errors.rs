use chrono::{DateTime, Utc};
use thiserror::Error;

/// The tick could not be committed. Nothing it touched is visible.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("tick {captured_at} is older than the latest recorded tick {latest}")]
    OutOfOrder {
        captured_at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// Per-record data problems. Recovered locally: the record is skipped and
/// counted, the tick carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordAnomaly {
    #[error("record has no `{0}`")]
    MissingField(&'static str),

    #[error("pair name `{0}` does not split into two symbols")]
    MalformedPairName(String),
}
