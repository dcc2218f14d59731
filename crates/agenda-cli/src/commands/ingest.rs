use std::path::Path;

use agenda_core::db::Database;
use agenda_core::models::ConflictSource;
use agenda_core::sync::{ingest_remote_patch, IngestOutcome};
use serde_json::Value;

use crate::commands::common::{open_database, resolve_item};
use crate::error::CliError;

pub fn run_ingest(
    id: &str,
    patch: &str,
    row_ref: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let patch = parse_patch(patch)?;
    let db = open_database(db_path)?;
    let outcome = ingest_into(&db, id, &patch, row_ref)?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

pub fn ingest_into(
    db: &Database,
    id: &str,
    patch: &Value,
    row_ref: Option<&str>,
) -> Result<IngestOutcome, CliError> {
    let item = resolve_item(id, db)?;
    Ok(ingest_remote_patch(
        db,
        &item.id,
        patch,
        ConflictSource::TasksPull,
        row_ref,
    )?)
}

pub fn parse_patch(raw: &str) -> Result<Value, CliError> {
    let patch: Value =
        serde_json::from_str(raw).map_err(|error| CliError::InvalidPatch(error.to_string()))?;
    if !patch.is_object() {
        return Err(CliError::InvalidPatch("expected a JSON object".to_string()));
    }
    Ok(patch)
}
