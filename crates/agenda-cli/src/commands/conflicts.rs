use std::path::Path;

use agenda_core::config::SyncConfig;
use agenda_core::db::{ConflictLedger, Database, SqliteConflictLedger};
use agenda_core::models::{ConflictFilter, ConflictSource, Resolution};
use agenda_core::remote::RemoteProvider;
use agenda_core::sync::ReconciliationDriver;
use agenda_core::Conflict;

use crate::commands::common::{format_conflict_lines, open_database, provider_from_env, resolve_conflict};
use crate::error::CliError;

pub fn run_conflicts_list(
    source: Option<ConflictSource>,
    include_resolved: bool,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conflicts = list_conflicts(&db, source, include_resolved, limit)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub fn list_conflicts(
    db: &Database,
    source: Option<ConflictSource>,
    include_resolved: bool,
    limit: usize,
) -> Result<Vec<Conflict>, CliError> {
    let mut filter = if include_resolved {
        ConflictFilter::default()
    } else {
        ConflictFilter::open()
    }
    .with_limit(limit);
    filter.source = source;
    Ok(SqliteConflictLedger::new(db.connection()).list(&filter)?)
}

pub async fn run_conflicts_resolve(
    id: &str,
    resolution: Resolution,
    db_path: &Path,
) -> Result<(), CliError> {
    let (config, provider) = provider_from_env()?;
    let db = open_database(db_path)?;
    let conflict = resolve_with(&db, &provider, &config, id, resolution).await?;

    println!("{} {}", conflict.id, resolution);
    Ok(())
}

pub async fn resolve_with<P: RemoteProvider + ?Sized>(
    db: &Database,
    provider: &P,
    config: &SyncConfig,
    id: &str,
    resolution: Resolution,
) -> Result<Conflict, CliError> {
    let conflict = resolve_conflict(id, db)?;
    let driver = ReconciliationDriver::new(db, provider, config);
    Ok(driver.apply_resolution(&conflict.id, resolution).await?)
}
