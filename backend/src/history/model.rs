use chrono::{DateTime, Utc};

use crate::history::errors::RecordAnomaly;

/// Splits a display name such as `SOL-USDC` into its two symbols.
/// Only the first separator counts: `JUP-SOL-2` gives `("JUP", "SOL-2")`.
pub fn split_pair_name(name: &str) -> Result<(&str, &str), RecordAnomaly> {
    match name.split_once('-') {
        Some((x, y)) if !x.trim().is_empty() && !y.trim().is_empty() => Ok((x.trim(), y.trim())),
        _ => Err(RecordAnomaly::MalformedPairName(name.to_string())),
    }
}

/// Outcome of differencing two readings of a lifetime counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeDelta {
    Value(f64),
    /// No earlier reading: the pool is new (or this snapshot lacks a counter).
    Unknown,
    /// The counter went backwards, e.g. an upstream reset.
    Negative { previous: f64, current: f64 },
}

impl FeeDelta {
    /// The value to store. Unknown and negative deltas are stored as NULL.
    pub fn value(&self) -> Option<f64> {
        match self {
            FeeDelta::Value(v) => Some(*v),
            FeeDelta::Unknown | FeeDelta::Negative { .. } => None,
        }
    }
}

pub fn fee_delta(previous: Option<f64>, current: Option<f64>) -> FeeDelta {
    match (previous, current) {
        (Some(previous), Some(current)) if current < previous => {
            FeeDelta::Negative { previous, current }
        }
        (Some(previous), Some(current)) => FeeDelta::Value(current - previous),
        _ => FeeDelta::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Committed,
    /// A tick with this capture time is already stored; nothing was written.
    AlreadyRecorded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub captured_at: DateTime<Utc>,
    pub outcome: ReconcileOutcome,
    pub pools_sampled: usize,
    pub pools_created: usize,
    pub tokens_created: usize,
    /// Records dropped before touching storage (missing ids, bad names).
    pub records_skipped: usize,
    /// Records rolled back to their savepoint after a storage error.
    pub records_failed: usize,
    /// Negative counter moves that were clamped to no value.
    pub anomalies: usize,
}

impl ReconcileReport {
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            outcome: ReconcileOutcome::Committed,
            pools_sampled: 0,
            pools_created: 0,
            tokens_created: 0,
            records_skipped: 0,
            records_failed: 0,
            anomalies: 0,
        }
    }
}
