use std::path::Path;

use agenda_core::db::{ConflictLedger, SqliteConflictLedger};
use agenda_core::Item;

use crate::commands::common::{format_conflict_lines, format_timestamp_ms, open_database, resolve_item};
use crate::error::CliError;

pub fn run_status(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let item = resolve_item(id, &db)?;
    let conflicts = SqliteConflictLedger::new(db.connection()).open_for_item(&item.id)?;

    if as_json {
        let body = serde_json::json!({
            "item": item,
            "open_conflicts": conflicts,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    for line in format_status_lines(&item) {
        println!("{line}");
    }
    for line in format_conflict_lines(&conflicts) {
        println!("  conflict {line}");
    }
    Ok(())
}

pub fn format_status_lines(item: &Item) -> Vec<String> {
    let optional_ms = |value: Option<i64>| value.map_or_else(|| "-".to_string(), format_timestamp_ms);
    vec![
        format!("id:          {}", item.id),
        format!("title:       {}", item.title),
        format!("status:      {}", item.status),
        format!(
            "scheduled:   {}",
            item.scheduled_at
                .map_or_else(|| "-".to_string(), |at| at.to_rfc3339())
        ),
        format!("sync:        {}", item.sync_status),
        format!("remote id:   {}", item.remote_id.as_deref().unwrap_or("-")),
        format!("attempts:    {}", item.sync_attempts),
        format!("last error:  {}", item.sync_error.as_deref().unwrap_or("-")),
        format!("synced at:   {}", optional_ms(item.synced_at)),
        format!("attempted:   {}", optional_ms(item.sync_attempted_at)),
    ]
}
