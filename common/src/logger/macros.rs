use tracing::{Span, field};

use super::TraceId;

/// Root span for one ingestion tick. `captured_at` and `pools` are recorded
/// once the snapshot is known.
pub fn tick_span(trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "tick",
        trace_id = %trace_id.as_str(),
        captured_at = field::Empty,
        pools = field::Empty
    )
}
