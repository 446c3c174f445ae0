pub mod errors;
pub mod query;
pub mod types;
pub mod window;

pub use errors::AnalyticsError;
pub use query::WindowAnalytics;
pub use types::{LOOKBACK_OPTIONS, MIN_TICKS_FOR_ANALYTICS, PoolSummary, PoolTick, Readiness};
pub use window::{BINS_PER_POSITION, TickSample, WindowAccumulator, WindowStats, YieldParams};
