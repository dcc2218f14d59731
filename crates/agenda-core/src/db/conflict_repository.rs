//! Conflict ledger backed by `SQLite`
//!
//! The ledger holds at most one open row per `(item_id, field_name)`. A new
//! measurement of an already-open divergence overwrites the values of that row
//! instead of adding another one. Rows are never deleted; resolving a conflict
//! only stamps its resolution, which keeps the table an audit trail.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{
    Conflict, ConflictDraft, ConflictFilter, ConflictId, ConflictSource, ConflictStatus, ItemId,
    Resolution,
};

const CONFLICT_COLUMNS: &str = "id, item_id, source, field_name, local_value, remote_value,
     remote_patch_json, status, resolution, row_ref, created_at, resolved_at";

/// Durable record of field-level disagreements between local and remote state
pub trait ConflictLedger {
    /// Open a conflict, or re-measure the open one for the same item and field
    fn open_or_update(&self, draft: &ConflictDraft) -> Result<Conflict>;

    /// Close an open conflict with the operator's decision
    ///
    /// Fails with `Error::NotFound` when the id is unknown or already resolved.
    fn resolve(&self, id: &ConflictId, resolution: Resolution) -> Result<Conflict>;

    /// Get a conflict by ID, in any state
    fn get(&self, id: &ConflictId) -> Result<Option<Conflict>>;

    /// List conflicts matching the filter, oldest first
    fn list(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>>;

    /// Number of open conflicts, optionally for one source
    fn count_open(&self, source: Option<ConflictSource>) -> Result<usize>;

    /// Open conflicts of one item, oldest first
    fn open_for_item(&self, item_id: &ItemId) -> Result<Vec<Conflict>>;

    /// IDs starting with `prefix`, at most `limit`
    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
}

/// `SQLite` implementation of `ConflictLedger`
pub struct SqliteConflictLedger<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictLedger<'a> {
    /// Create a new ledger with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conflict> {
        let id: String = row.get(0)?;
        let item_id: String = row.get(1)?;
        let source: String = row.get(2)?;
        let remote_patch_json: Option<String> = row.get(6)?;
        let status: String = row.get(7)?;
        let resolution: Option<String> = row.get(8)?;

        let remote_patch = remote_patch_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|error| conversion_error(6, Box::new(error)))?;
        let resolution = resolution
            .map(|raw| raw.parse::<Resolution>())
            .transpose()
            .map_err(|error| conversion_error(8, Box::new(error)))?;

        Ok(Conflict {
            id: id
                .parse()
                .map_err(|error| conversion_error(0, Box::new(error)))?,
            item_id: item_id
                .parse()
                .map_err(|error| conversion_error(1, Box::new(error)))?,
            source: source
                .parse()
                .map_err(|error: Error| conversion_error(2, Box::new(error)))?,
            field_name: row.get(3)?,
            local_value: row.get(4)?,
            remote_value: row.get(5)?,
            remote_patch,
            status: status
                .parse()
                .map_err(|error: Error| conversion_error(7, Box::new(error)))?,
            resolution,
            row_ref: row.get(9)?,
            created_at: row.get(10)?,
            resolved_at: row.get(11)?,
        })
    }

    fn find_open(&self, item_id: &ItemId, field_name: &str) -> Result<Option<Conflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflicts
                     WHERE item_id = ?1 AND field_name = ?2 AND status = 'open'"
                ),
                params![item_id.as_str(), field_name],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    fn require(&self, id: &ConflictId) -> Result<Conflict> {
        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))
    }
}

fn conversion_error(
    column: usize,
    error: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, error)
}

impl ConflictLedger for SqliteConflictLedger<'_> {
    fn open_or_update(&self, draft: &ConflictDraft) -> Result<Conflict> {
        let remote_patch_json = draft
            .remote_patch
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        if let Some(existing) = self.find_open(&draft.item_id, &draft.field_name)? {
            self.conn.execute(
                "UPDATE conflicts
                 SET source = ?1, local_value = ?2, remote_value = ?3,
                     remote_patch_json = ?4, row_ref = COALESCE(?5, row_ref)
                 WHERE id = ?6 AND status = 'open'",
                params![
                    draft.source.as_str(),
                    draft.local_value,
                    draft.remote_value,
                    remote_patch_json,
                    draft.row_ref,
                    existing.id.as_str(),
                ],
            )?;
            tracing::debug!(
                "Updated open conflict {} for item {} field {}",
                existing.id,
                draft.item_id,
                draft.field_name
            );
            return self.require(&existing.id);
        }

        let id = ConflictId::new();
        let now = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO conflicts (
                id, item_id, source, field_name, local_value, remote_value,
                remote_patch_json, status, row_ref, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?9)",
            params![
                id.as_str(),
                draft.item_id.as_str(),
                draft.source.as_str(),
                draft.field_name,
                draft.local_value,
                draft.remote_value,
                remote_patch_json,
                draft.row_ref,
                now,
            ],
        )?;
        tracing::info!(
            "Opened {} conflict {} for item {} field {}",
            draft.source,
            id,
            draft.item_id,
            draft.field_name
        );
        self.require(&id)
    }

    fn resolve(&self, id: &ConflictId, resolution: Resolution) -> Result<Conflict> {
        let now = Utc::now().timestamp_millis();
        let rows = self.conn.execute(
            "UPDATE conflicts
             SET status = 'resolved', resolution = ?1, resolved_at = ?2
             WHERE id = ?3 AND status = 'open'",
            params![resolution.as_str(), now, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("open conflict {id}")));
        }

        tracing::info!("Resolved conflict {id} as {resolution}");
        self.require(id)
    }

    fn get(&self, id: &ConflictId) -> Result<Option<Conflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?1"),
                params![id.as_str()],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    fn list(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(source) = filter.source {
            values.push(source.as_str().to_string());
            clauses.push(format!("source = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {CONFLICT_COLUMNS} FROM conflicts");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let conflicts = stmt
            .query_map(params_from_iter(values.iter()), Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    fn count_open(&self, source: Option<ConflictSource>) -> Result<usize> {
        let count = match source {
            Some(source) => self.conn.query_row(
                "SELECT COUNT(*) FROM conflicts WHERE status = 'open' AND source = ?1",
                params![source.as_str()],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM conflicts WHERE status = 'open'",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    fn open_for_item(&self, item_id: &ItemId) -> Result<Vec<Conflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts
             WHERE item_id = ?1 AND status = ?2
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let conflicts = stmt
            .query_map(
                params![item_id.as_str(), ConflictStatus::Open.as_str()],
                Self::parse_conflict,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM conflicts
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
