use std::path::Path;

use agenda_core::sync::SyncStateTracker;

use crate::commands::common::{open_database, resolve_item};
use crate::error::CliError;

pub fn run_reset(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let mut item = resolve_item(id, &db)?;

    SyncStateTracker::new(db.connection()).reset(&mut item)?;
    tracing::info!("Reset sync state of item {}", item.id);

    println!("{} {}", item.id, item.sync_status);
    Ok(())
}
