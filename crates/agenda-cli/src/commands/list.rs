use std::path::Path;

use agenda_core::db::{ItemRepository, SqliteItemRepository};

use crate::commands::common::{format_item_lines, open_database};
use crate::error::CliError;

pub fn run_list(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let items = SqliteItemRepository::new(db.connection()).list(limit, 0)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items yet. Add one with `agenda add`.");
        return Ok(());
    }

    for line in format_item_lines(&items) {
        println!("{line}");
    }
    Ok(())
}
