use std::env;
use std::path::{Path, PathBuf};

use agenda_core::config::{ProviderConfig, SyncConfig};
use agenda_core::db::{ConflictLedger, Database, ItemRepository, SqliteConflictLedger, SqliteItemRepository};
use agenda_core::remote::HttpCalendarProvider;
use agenda_core::{Conflict, ConflictId, Item, ItemId};
use chrono::Utc;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("AGENDA_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agenda")
        .join("agenda.db")
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path)?)
}

/// Sync settings and an HTTP provider, both from the environment
pub fn provider_from_env() -> Result<(SyncConfig, HttpCalendarProvider), CliError> {
    let sync_config = SyncConfig::from_env()?;
    let provider = HttpCalendarProvider::new(ProviderConfig::from_env()?)?;
    Ok((sync_config, provider))
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CliError::EmptyId);
    }
    Ok(id.to_ascii_lowercase())
}

pub fn resolve_item(query: &str, db: &Database) -> Result<Item, CliError> {
    let query = normalize_identifier(query)?;
    let repo = SqliteItemRepository::new(db.connection());

    if let Ok(item_id) = query.parse::<ItemId>() {
        if let Some(item) = repo.get(&item_id)? {
            return Ok(item);
        }
    }

    let matching_ids = repo.list_ids_by_prefix(&query, 3)?;
    let resolved_id = pick_single(&query, &matching_ids)?
        .ok_or_else(|| CliError::ItemNotFound(query.clone()))?;
    let item_id = resolved_id
        .parse::<ItemId>()
        .map_err(|_| CliError::ItemNotFound(query.clone()))?;
    repo.get(&item_id)?
        .ok_or_else(|| CliError::ItemNotFound(query.clone()))
}

pub fn resolve_conflict(query: &str, db: &Database) -> Result<Conflict, CliError> {
    let query = normalize_identifier(query)?;
    let ledger = SqliteConflictLedger::new(db.connection());

    if let Ok(conflict_id) = query.parse::<ConflictId>() {
        if let Some(conflict) = ledger.get(&conflict_id)? {
            return Ok(conflict);
        }
    }

    let matching_ids = ledger.list_ids_by_prefix(&query, 3)?;
    let resolved_id = pick_single(&query, &matching_ids)?
        .ok_or_else(|| CliError::ConflictNotFound(query.clone()))?;
    let conflict_id = resolved_id
        .parse::<ConflictId>()
        .map_err(|_| CliError::ConflictNotFound(query.clone()))?;
    ledger
        .get(&conflict_id)?
        .ok_or_else(|| CliError::ConflictNotFound(query.clone()))
}

fn pick_single<'a>(query: &str, matching_ids: &'a [String]) -> Result<Option<&'a String>, CliError> {
    match matching_ids {
        [] => Ok(None),
        [single] => Ok(Some(single)),
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(|id| short_id(id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_item_lines(items: &[Item]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .iter()
        .map(|item| {
            let id = short_id(&item.id.to_string());
            let title = preview(&item.title, 32);
            let when = item
                .scheduled_at
                .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
            let edited = format_relative_time(item.updated_at, now_ms);
            format!(
                "{id:<13}  {title:<32}  {:<9}  {:<7}  {when:<16}  {edited}",
                item.status.as_str(),
                item.sync_status.as_str()
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[Conflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let state = conflict
                .resolution
                .map_or_else(|| conflict.status.as_str().to_string(), |resolution| resolution.to_string());
            format!(
                "{}  {}  {:<14}  item={}  {}: local={} remote={}  [{state}]",
                short_id(&conflict.id.to_string()),
                format_timestamp_ms(conflict.created_at),
                conflict.source.as_str(),
                short_id(&conflict.item_id.to_string()),
                conflict.field_name,
                conflict.local_value.as_deref().unwrap_or("-"),
                conflict.remote_value.as_deref().unwrap_or("-"),
            )
        })
        .collect()
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp_ms(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
