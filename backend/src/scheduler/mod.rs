pub mod ingest;
pub mod types;

pub use ingest::IngestScheduler;
pub use types::{SnapshotSink, SnapshotSource, TickError, TickStatus};
