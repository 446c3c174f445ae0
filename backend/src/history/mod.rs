pub mod errors;
pub mod model;
pub mod reconciler;

pub use errors::{RecordAnomaly, ReconcileError};
pub use model::{FeeDelta, ReconcileOutcome, ReconcileReport, fee_delta, split_pair_name};
pub use reconciler::Reconciler;
