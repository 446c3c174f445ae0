use chrono::{DateTime, TimeZone, Utc};

/// Converts stored epoch milliseconds back into a UTC timestamp.
///
/// Out-of-range values clamp to the epoch rather than panic; the store only
/// ever holds values produced by `DateTime::timestamp_millis`.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
