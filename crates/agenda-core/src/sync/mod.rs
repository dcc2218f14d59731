//! Reconciliation engine: retry bookkeeping, drift classification, field
//! diffs and the batch driver that ties them to the store and the provider.

mod drift;
mod driver;
mod field_diff;
mod tracker;

pub use drift::{classify, DriftKind};
pub use driver::{
    ingest_remote_patch, IngestOutcome, ItemReport, ReconciliationDriver, ReconciliationReport,
    SyncOutcome,
};
pub use field_diff::{apply_remote_patch, detect_field_conflicts, PULLED_FIELDS};
pub use tracker::{RetryPolicy, SyncStateTracker};
