use std::path::Path;

use agenda_core::db::{ItemRepository, SqliteItemRepository};
use agenda_core::models::{ItemStatus, NewItem};
use agenda_core::util::{normalize_text_option, parse_timestamp};

use crate::commands::common::open_database;
use crate::error::CliError;

pub fn run_add(
    title_parts: &[String],
    at: Option<&str>,
    duration: Option<u32>,
    description: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let new_item = build_new_item(title_parts, at, duration, description)?;

    let db = open_database(db_path)?;
    let item = SqliteItemRepository::new(db.connection()).create(new_item)?;

    println!("{}", item.id);
    Ok(())
}

pub fn build_new_item(
    title_parts: &[String],
    at: Option<&str>,
    duration: Option<u32>,
    description: Option<String>,
) -> Result<NewItem, CliError> {
    let title = normalize_text_option(Some(title_parts.join(" "))).ok_or(CliError::EmptyTitle)?;
    let scheduled_at = at
        .map(|raw| parse_timestamp(raw).ok_or_else(|| CliError::InvalidTime(raw.to_string())))
        .transpose()?;

    Ok(NewItem {
        title,
        description: normalize_text_option(description),
        status: if scheduled_at.is_some() {
            ItemStatus::Scheduled
        } else {
            ItemStatus::Inbox
        },
        scheduled_at,
        duration_min: duration,
    })
}
