//! Per-item sync bookkeeping and the retry schedule built on it.

use serde::{Deserialize, Serialize};

use crate::db::{ItemRepository, SqliteItemRepository};
use crate::error::Result;
use crate::models::{Item, SyncStatus};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_SECS: u64 = 60;
const DEFAULT_MAX_DELAY_SECS: u64 = 3600;

/// Exponential backoff with a ceiling on attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
        }
    }
}

impl RetryPolicy {
    /// Wait after the given number of failed attempts, in seconds
    pub fn delay_secs(&self, attempts: u32) -> u64 {
        if attempts == 0 {
            return 0;
        }
        let factor = 2_u64.saturating_pow(attempts - 1);
        self.base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs)
    }

    /// Failed too often; only a manual reset brings the item back
    pub const fn is_exhausted(&self, item: &Item) -> bool {
        matches!(item.sync_status, SyncStatus::Error) && item.sync_attempts >= self.max_attempts
    }

    /// Whether a pass at `now_ms` should call the resolver for this item
    pub fn is_eligible(&self, item: &Item, now_ms: i64) -> bool {
        match item.sync_status {
            SyncStatus::Pending => true,
            SyncStatus::Synced => false,
            SyncStatus::Error => {
                if self.is_exhausted(item) {
                    return false;
                }
                let Some(attempted_at) = item.sync_attempted_at else {
                    return true;
                };
                let delay_ms = i64::try_from(self.delay_secs(item.sync_attempts))
                    .unwrap_or(i64::MAX)
                    .saturating_mul(1000);
                now_ms >= attempted_at.saturating_add(delay_ms)
            }
        }
    }
}

/// Records sync facts on items and persists them
///
/// Holds no policy: callers decide when to retry from the recorded attempts.
pub struct SyncStateTracker<'a> {
    items: SqliteItemRepository<'a>,
}

impl<'a> SyncStateTracker<'a> {
    pub const fn new(conn: &'a rusqlite::Connection) -> Self {
        Self {
            items: SqliteItemRepository::new(conn),
        }
    }

    pub fn record_success(&self, item: &mut Item, remote_id: String, now_ms: i64) -> Result<()> {
        item.remote_id = Some(remote_id);
        item.sync_status = SyncStatus::Synced;
        item.sync_error = None;
        item.synced_at = Some(now_ms);
        item.sync_attempted_at = Some(now_ms);
        self.items.save_sync_state(item)
    }

    /// Count a failed resolve or write; an existing binding is kept
    pub fn record_failure(&self, item: &mut Item, message: &str, now_ms: i64) -> Result<()> {
        item.sync_attempts = item.sync_attempts.saturating_add(1);
        item.sync_status = SyncStatus::Error;
        item.sync_error = Some(message.to_string());
        item.sync_attempted_at = Some(now_ms);
        self.items.save_sync_state(item)
    }

    /// Clear the failure history after an operator intervention
    pub fn reset(&self, item: &mut Item) -> Result<()> {
        item.sync_attempts = 0;
        item.sync_error = None;
        item.sync_attempted_at = None;
        item.sync_status = if item.remote_id.is_some() {
            SyncStatus::Synced
        } else {
            SyncStatus::Pending
        };
        self.items.save_sync_state(item)
    }

    /// Drop the remote binding and queue the item for a fresh resolve
    pub fn requeue(&self, item: &mut Item) -> Result<()> {
        item.remote_id = None;
        item.remote_parent_id = None;
        item.synced_at = None;
        self.reset(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NewItem;
    use pretty_assertions::assert_eq;

    fn stored_item(db: &Database) -> Item {
        SqliteItemRepository::new(db.connection())
            .create(NewItem {
                title: "Call bank".to_string(),
                ..NewItem::default()
            })
            .unwrap()
    }

    fn reload(db: &Database, item: &Item) -> Item {
        SqliteItemRepository::new(db.connection())
            .get(&item.id)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn success_binds_and_clears_error() {
        let db = Database::open_in_memory().unwrap();
        let tracker = SyncStateTracker::new(db.connection());
        let mut item = stored_item(&db);

        tracker.record_failure(&mut item, "HTTP 503", 1_000).unwrap();
        tracker
            .record_success(&mut item, "evt-1".to_string(), 2_000)
            .unwrap();

        let stored = reload(&db, &item);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(stored.remote_id.as_deref(), Some("evt-1"));
        assert_eq!(stored.sync_error, None);
        assert_eq!(stored.synced_at, Some(2_000));
        // Attempts are history, not reset by a success
        assert_eq!(stored.sync_attempts, 1);
        assert!(stored.has_consistent_binding());
    }

    #[test]
    fn failure_keeps_existing_binding() {
        let db = Database::open_in_memory().unwrap();
        let tracker = SyncStateTracker::new(db.connection());
        let mut item = stored_item(&db);
        tracker
            .record_success(&mut item, "evt-1".to_string(), 1_000)
            .unwrap();

        tracker.record_failure(&mut item, "timeout", 2_000).unwrap();
        tracker.record_failure(&mut item, "timeout again", 3_000).unwrap();

        let stored = reload(&db, &item);
        assert_eq!(stored.sync_status, SyncStatus::Error);
        assert_eq!(stored.sync_attempts, 2);
        assert_eq!(stored.sync_error.as_deref(), Some("timeout again"));
        assert_eq!(stored.remote_id.as_deref(), Some("evt-1"));
        assert_eq!(stored.sync_attempted_at, Some(3_000));
    }

    #[test]
    fn reset_returns_unbound_item_to_pending() {
        let db = Database::open_in_memory().unwrap();
        let tracker = SyncStateTracker::new(db.connection());
        let mut item = stored_item(&db);
        tracker.record_failure(&mut item, "boom", 1_000).unwrap();

        tracker.reset(&mut item).unwrap();
        let stored = reload(&db, &item);
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.sync_attempts, 0);
        assert_eq!(stored.sync_error, None);
    }

    #[test]
    fn requeue_drops_binding() {
        let db = Database::open_in_memory().unwrap();
        let tracker = SyncStateTracker::new(db.connection());
        let mut item = stored_item(&db);
        tracker
            .record_success(&mut item, "evt-9".to_string(), 1_000)
            .unwrap();

        tracker.requeue(&mut item).unwrap();
        let stored = reload(&db, &item);
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.remote_id, None);
        assert_eq!(stored.synced_at, None);
        assert!(stored.has_consistent_binding());
    }

    #[test]
    fn delay_doubles_up_to_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_secs: 60,
            max_delay_secs: 300,
        };
        assert_eq!(policy.delay_secs(0), 0);
        assert_eq!(policy.delay_secs(1), 60);
        assert_eq!(policy.delay_secs(2), 120);
        assert_eq!(policy.delay_secs(3), 240);
        assert_eq!(policy.delay_secs(4), 300);
        assert_eq!(policy.delay_secs(64), 300);
    }

    #[test]
    fn eligibility_follows_status_and_backoff() {
        let policy = RetryPolicy::default();
        let mut item = Item::new(NewItem {
            title: "x".to_string(),
            ..NewItem::default()
        });
        assert!(policy.is_eligible(&item, 0));

        item.sync_status = SyncStatus::Synced;
        item.remote_id = Some("evt".to_string());
        assert!(!policy.is_eligible(&item, i64::MAX));

        item.sync_status = SyncStatus::Error;
        item.sync_attempts = 2;
        item.sync_attempted_at = Some(1_000_000);
        assert!(!policy.is_eligible(&item, 1_000_000 + 119_999));
        assert!(policy.is_eligible(&item, 1_000_000 + 120_000));

        item.sync_attempts = policy.max_attempts;
        assert!(policy.is_exhausted(&item));
        assert!(!policy.is_eligible(&item, i64::MAX));
    }
}
