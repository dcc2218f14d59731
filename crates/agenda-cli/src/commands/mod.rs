pub mod add;
pub mod common;
pub mod conflicts;
pub mod digest;
pub mod ingest;
pub mod list;
pub mod reconcile;
pub mod reset;
pub mod status;
