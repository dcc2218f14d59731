//! Item repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Item, ItemId, NewItem, SyncStatus};
use crate::util::{format_timestamp, parse_timestamp};

const ITEM_COLUMNS: &str = "id, title, description, status, scheduled_at, duration_min,
     remote_id, remote_parent_id, sync_status, sync_attempts, sync_error,
     synced_at, sync_attempted_at, created_at, updated_at";

/// Per-status item counts, read by digest and nudge consumers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatusCounts {
    pub pending: usize,
    pub synced: usize,
    pub error: usize,
}

/// Trait for item storage operations
pub trait ItemRepository {
    /// Create a new, pending item
    fn create(&self, new_item: NewItem) -> Result<Item>;

    /// Get an item by ID
    fn get(&self, id: &ItemId) -> Result<Option<Item>>;

    /// List items, most recently edited first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Item>>;

    /// List items in the given sync state, oldest edit first
    fn list_by_sync_status(&self, status: SyncStatus, limit: usize) -> Result<Vec<Item>>;

    /// Items a reconciliation pass should look at: unsynced ones and bound ones
    fn list_for_reconcile(&self, limit: usize) -> Result<Vec<Item>>;

    /// Persist local fields (title, description, status, schedule) and bump `updated_at`
    fn update(&self, item: &Item) -> Result<Item>;

    /// Persist the sync fields of an item without touching local fields
    fn save_sync_state(&self, item: &Item) -> Result<()>;

    /// Count items per sync status
    fn sync_status_counts(&self) -> Result<SyncStatusCounts>;

    /// IDs starting with `prefix`, at most `limit`
    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
}

/// `SQLite` implementation of `ItemRepository`
pub struct SqliteItemRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteItemRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
        let id: String = row.get(0)?;
        let status: String = row.get(3)?;
        let scheduled_at: Option<String> = row.get(4)?;
        let sync_status: String = row.get(8)?;

        Ok(Item {
            id: id
                .parse()
                .map_err(|error| conversion_error(0, Box::new(error)))?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: status
                .parse()
                .map_err(|error: Error| conversion_error(3, Box::new(error)))?,
            scheduled_at: scheduled_at.as_deref().and_then(parse_timestamp),
            duration_min: row.get(5)?,
            remote_id: row.get(6)?,
            remote_parent_id: row.get(7)?,
            sync_status: sync_status
                .parse()
                .map_err(|error: Error| conversion_error(8, Box::new(error)))?,
            sync_attempts: row.get(9)?,
            sync_error: row.get(10)?,
            synced_at: row.get(11)?,
            sync_attempted_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn query_items(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(sql)?;
        let items = stmt
            .query_map(params, Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }
}

fn conversion_error(
    column: usize,
    error: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, error)
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create(&self, new_item: NewItem) -> Result<Item> {
        if new_item.title.trim().is_empty() {
            return Err(Error::InvalidInput("Item title cannot be empty".into()));
        }
        let item = Item::new(new_item);

        self.conn.execute(
            "INSERT INTO items (
                id, title, description, status, scheduled_at, duration_min,
                sync_status, sync_attempts, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                item.id.as_str(),
                item.title,
                item.description,
                item.status.as_str(),
                item.scheduled_at.as_ref().map(format_timestamp),
                item.duration_min,
                item.sync_status.as_str(),
                item.sync_attempts,
                item.created_at,
                item.updated_at,
            ],
        )?;

        Ok(item)
    }

    fn get(&self, id: &ItemId) -> Result<Option<Item>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id.as_str()],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2"
            ),
            params![limit as i64, offset as i64],
        )
    }

    fn list_by_sync_status(&self, status: SyncStatus, limit: usize) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE sync_status = ?1
                 ORDER BY updated_at ASC, rowid ASC
                 LIMIT ?2"
            ),
            params![status.as_str(), limit as i64],
        )
    }

    fn list_for_reconcile(&self, limit: usize) -> Result<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE sync_status IN ('pending', 'error') OR remote_id IS NOT NULL
                 ORDER BY updated_at ASC, rowid ASC
                 LIMIT ?1"
            ),
            params![limit as i64],
        )
    }

    fn update(&self, item: &Item) -> Result<Item> {
        let now = Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE items
             SET title = ?1, description = ?2, status = ?3, scheduled_at = ?4,
                 duration_min = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                item.title,
                item.description,
                item.status.as_str(),
                item.scheduled_at.as_ref().map(format_timestamp),
                item.duration_min,
                now,
                item.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("item {}", item.id)));
        }

        self.get(&item.id)?
            .ok_or_else(|| Error::NotFound(format!("item {}", item.id)))
    }

    fn save_sync_state(&self, item: &Item) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE items
             SET remote_id = ?1, remote_parent_id = ?2, sync_status = ?3,
                 sync_attempts = ?4, sync_error = ?5, synced_at = ?6,
                 sync_attempted_at = ?7
             WHERE id = ?8",
            params![
                item.remote_id,
                item.remote_parent_id,
                item.sync_status.as_str(),
                item.sync_attempts,
                item.sync_error,
                item.synced_at,
                item.sync_attempted_at,
                item.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("item {}", item.id)));
        }
        Ok(())
    }

    fn sync_status_counts(&self) -> Result<SyncStatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT sync_status, COUNT(*) FROM items GROUP BY sync_status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = SyncStatusCounts::default();
        for (status, count) in rows {
            match status.parse::<SyncStatus>()? {
                SyncStatus::Pending => counts.pending += count,
                SyncStatus::Synced => counts.synced += count,
                SyncStatus::Error => counts.error += count,
            }
        }
        Ok(counts)
    }

    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM items
             WHERE substr(id, 1, length(?1)) = ?1
             ORDER BY id ASC
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![prefix, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}
