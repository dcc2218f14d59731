//! Read models for the nudge and daily-digest collaborators.
//!
//! Nothing here writes sync state; the digest only reads it, and the day
//! bucket is owned and persisted by whoever emits the nudge.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::{ConflictLedger, ItemRepository, SqliteConflictLedger, SqliteItemRepository, SyncStatusCounts};
use crate::error::Result;
use crate::models::{ConflictSource, ItemId, SyncStatus};

const ERRORED_ITEMS_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErroredItem {
    pub item_id: ItemId,
    pub title: String,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Snapshot of sync health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncDigest {
    pub counts: SyncStatusCounts,
    pub open_conflicts: BTreeMap<String, usize>,
    pub errored: Vec<ErroredItem>,
}

impl SyncDigest {
    pub fn collect(conn: &Connection) -> Result<Self> {
        let items = SqliteItemRepository::new(conn);
        let ledger = SqliteConflictLedger::new(conn);

        let mut open_conflicts = BTreeMap::new();
        for source in [ConflictSource::CalendarDrift, ConflictSource::TasksPull] {
            open_conflicts.insert(source.as_str().to_string(), ledger.count_open(Some(source))?);
        }

        let errored = items
            .list_by_sync_status(SyncStatus::Error, ERRORED_ITEMS_LIMIT)?
            .into_iter()
            .map(|item| ErroredItem {
                item_id: item.id,
                title: item.title,
                attempts: item.sync_attempts,
                error: item.sync_error,
            })
            .collect();

        Ok(Self {
            counts: items.sync_status_counts()?,
            open_conflicts,
            errored,
        })
    }

    pub fn total_open_conflicts(&self) -> usize {
        self.open_conflicts.values().sum()
    }

    /// Whether anything needs the operator's attention
    pub fn needs_attention(&self) -> bool {
        self.counts.error > 0 || self.total_open_conflicts() > 0
    }

    /// Items created since `since_ms`, for the daily summary
    pub fn created_since(conn: &Connection, since_ms: i64) -> Result<usize> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE created_at >= ?1",
            params![since_ms],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Per-day nudge bookkeeping: what was counted today and whether it was sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub day: NaiveDate,
    pub counts: BTreeMap<String, u32>,
    pub emitted: bool,
}

impl DayBucket {
    pub const fn new(day: NaiveDate) -> Self {
        Self {
            day,
            counts: BTreeMap::new(),
            emitted: false,
        }
    }

    /// Start a fresh bucket when the date changed; returns whether it did
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.day == today {
            return false;
        }
        *self = Self::new(today);
        true
    }

    pub fn record(&mut self, kind: &str) {
        *self.counts.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, kind: &str) -> u32 {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn mark_emitted(&mut self) {
        self.emitted = true;
    }

    /// Something was counted today and no nudge went out yet
    pub fn should_emit(&self) -> bool {
        !self.emitted && self.counts.values().any(|count| *count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ConflictDraft, NewItem, FIELD_TIME};
    use crate::sync::SyncStateTracker;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn digest_counts_statuses_conflicts_and_errors() {
        let db = Database::open_in_memory().unwrap();
        let items = SqliteItemRepository::new(db.connection());
        let tracker = SyncStateTracker::new(db.connection());

        let pending = items.create(NewItem { title: "a".into(), ..NewItem::default() }).unwrap();
        let mut synced = items.create(NewItem { title: "b".into(), ..NewItem::default() }).unwrap();
        let mut failing = items.create(NewItem { title: "c".into(), ..NewItem::default() }).unwrap();
        tracker.record_success(&mut synced, "evt-1".to_string(), 1).unwrap();
        tracker.record_failure(&mut failing, "HTTP 403", 1).unwrap();

        SqliteConflictLedger::new(db.connection())
            .open_or_update(&ConflictDraft::new(
                pending.id,
                ConflictSource::CalendarDrift,
                FIELD_TIME,
                None,
                None,
            ))
            .unwrap();

        let digest = SyncDigest::collect(db.connection()).unwrap();
        assert_eq!(
            digest.counts,
            SyncStatusCounts {
                pending: 1,
                synced: 1,
                error: 1
            }
        );
        assert_eq!(digest.open_conflicts.get("calendar_drift"), Some(&1));
        assert_eq!(digest.open_conflicts.get("tasks_pull"), Some(&0));
        assert_eq!(digest.total_open_conflicts(), 1);
        assert_eq!(
            digest.errored,
            vec![ErroredItem {
                item_id: failing.id,
                title: "c".to_string(),
                attempts: 1,
                error: Some("HTTP 403".to_string()),
            }]
        );
        assert!(digest.needs_attention());
        assert_eq!(SyncDigest::created_since(db.connection(), 0).unwrap(), 3);
    }

    #[test]
    fn empty_store_needs_no_attention() {
        let db = Database::open_in_memory().unwrap();
        let digest = SyncDigest::collect(db.connection()).unwrap();
        assert!(!digest.needs_attention());
        assert!(digest.errored.is_empty());
    }

    #[test]
    fn day_bucket_resets_on_date_change() {
        let mut bucket = DayBucket::new(day(1));
        assert!(!bucket.should_emit());

        bucket.record("conflict");
        bucket.record("conflict");
        bucket.record("error");
        assert_eq!(bucket.count("conflict"), 2);
        assert!(bucket.should_emit());

        bucket.mark_emitted();
        assert!(!bucket.should_emit());
        assert!(!bucket.roll_over(day(1)));
        assert!(bucket.emitted);

        assert!(bucket.roll_over(day(2)));
        assert_eq!(bucket, DayBucket::new(day(2)));
        assert_eq!(bucket.count("conflict"), 0);
    }
}
