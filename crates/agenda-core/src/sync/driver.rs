//! Batch reconciliation of local items against the remote provider.
//!
//! Each item is handled on its own: remote calls first, then a single local
//! transaction that writes the item's sync fields and any ledger rows
//! together. A failing item is recorded and the batch moves on.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use super::drift::{classify, DriftKind};
use super::field_diff::{apply_remote_patch, detect_field_conflicts, status_patch};
use super::tracker::SyncStateTracker;
use crate::config::SyncConfig;
use crate::db::{ConflictLedger, Database, ItemRepository, SqliteConflictLedger, SqliteItemRepository};
use crate::error::{Error, Result};
use crate::models::{
    Conflict, ConflictDraft, ConflictId, ConflictSource, Item, ItemId, ItemStatus, Resolution,
    SyncStatus, FIELD_EXISTENCE,
};
use crate::remote::{RemoteError, RemoteObject, RemoteProvider, RemoteResolver};
use crate::util::format_timestamp;

/// What happened to an item's remote binding during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing to resolve: already bound, or not meant to be mirrored
    Unchanged,
    /// Bound to a remote object in this pass
    Synced { remote_id: String },
    /// Local edits of a bound item were written to its remote object
    Pushed { remote_id: String },
    /// Backoff window still open
    NotDue,
    /// Failed with an error worth retrying
    RetryLater { error: String },
    /// Failed in a way retries will not fix, or out of attempts
    FailedTerminally { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub sync: SyncOutcome,
    /// Result of the verification pull, if one was made
    pub drift: Option<DriftKind>,
}

impl ItemReport {
    pub const fn is_conflicted(&self) -> bool {
        matches!(
            self.drift,
            Some(DriftKind::MissingEvent | DriftKind::UnexpectedEvent | DriftKind::TimeMismatch)
        )
    }
}

/// Per-item results of one `reconcile_batch` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub items: Vec<ItemReport>,
}

impl ReconciliationReport {
    /// Items that ended the pass bound and without drift
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|report| {
                matches!(
                    report.sync,
                    SyncOutcome::Synced { .. } | SyncOutcome::Pushed { .. } | SyncOutcome::Unchanged
                )
                    && !report.is_conflicted()
            })
            .count()
    }

    pub fn retried_later(&self) -> usize {
        self.items
            .iter()
            .filter(|report| matches!(report.sync, SyncOutcome::RetryLater { .. } | SyncOutcome::NotDue))
            .count()
    }

    pub fn conflicted(&self) -> usize {
        self.items.iter().filter(|report| report.is_conflicted()).count()
    }

    pub fn failed_terminally(&self) -> usize {
        self.items
            .iter()
            .filter(|report| matches!(report.sync, SyncOutcome::FailedTerminally { .. }))
            .count()
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&ItemReport> {
        self.items.iter().find(|report| report.item_id == *item_id)
    }
}

/// Result of feeding a pulled remote patch into the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The item had no unsynced edits; the patch was applied
    Applied,
    /// The item had unsynced edits; this many fields went to the ledger
    Conflicted { fields: usize },
    /// The patch matched the item
    Unchanged,
}

pub struct ReconciliationDriver<'a, P: RemoteProvider + ?Sized> {
    db: &'a Database,
    provider: &'a P,
    config: &'a SyncConfig,
}

impl<'a, P: RemoteProvider + ?Sized> ReconciliationDriver<'a, P> {
    pub const fn new(db: &'a Database, provider: &'a P, config: &'a SyncConfig) -> Self {
        Self {
            db,
            provider,
            config,
        }
    }

    /// Reconcile the items a pass should look at, up to `limit`
    pub async fn reconcile_pending(&self, limit: usize) -> Result<ReconciliationReport> {
        let items = SqliteItemRepository::new(self.db.connection()).list_for_reconcile(limit)?;
        Ok(self.reconcile_batch(&items).await)
    }

    /// Reconcile each item independently; failures never abort the batch
    ///
    /// Items are re-read from the store, so stale values only name the rows.
    pub async fn reconcile_batch(&self, items: &[Item]) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        for item in items {
            let item_report = match self.reconcile_item(&item.id).await {
                Ok(item_report) => item_report,
                Err(error) => {
                    tracing::warn!("Reconciling item {} failed: {error}", item.id);
                    ItemReport {
                        item_id: item.id,
                        sync: SyncOutcome::RetryLater {
                            error: error.to_string(),
                        },
                        drift: None,
                    }
                }
            };
            report.items.push(item_report);
        }

        tracing::info!(
            "Reconciled {} items: {} ok, {} retry later, {} conflicted, {} failed",
            report.items.len(),
            report.succeeded(),
            report.retried_later(),
            report.conflicted(),
            report.failed_terminally()
        );
        report
    }

    async fn reconcile_item(&self, item_id: &ItemId) -> Result<ItemReport> {
        let item = load_item(&SqliteItemRepository::new(self.db.connection()), item_id)?;
        let sync = self.sync_item(item).await?;

        // A binding written in this pass came from local state
        let drift = if matches!(
            sync,
            SyncOutcome::Synced { .. } | SyncOutcome::Pushed { .. }
        ) {
            None
        } else {
            let current = load_item(&SqliteItemRepository::new(self.db.connection()), item_id)?;
            self.verify(&current).await?
        };

        Ok(ItemReport {
            item_id: *item_id,
            sync,
            drift,
        })
    }

    /// Create the remote object of an unbound item, or push local edits of a
    /// bound one
    async fn sync_item(&self, item: Item) -> Result<SyncOutcome> {
        let policy = &self.config.retry;

        if !wants_remote(&item) {
            return Ok(SyncOutcome::Unchanged);
        }
        if item.remote_id.is_some() && !item.has_local_changes() {
            return Ok(SyncOutcome::Unchanged);
        }
        if policy.is_exhausted(&item) {
            let error = Error::AttemptsExceeded {
                item_id: item.id.to_string(),
                attempts: item.sync_attempts,
            };
            tracing::debug!("Skipping item {}: {error}", item.id);
            return Ok(SyncOutcome::FailedTerminally {
                error: error.to_string(),
            });
        }
        let started_at = Utc::now().timestamp_millis();
        if item.sync_status != SyncStatus::Synced && !policy.is_eligible(&item, started_at) {
            tracing::debug!("Item {} is backing off", item.id);
            return Ok(SyncOutcome::NotDue);
        }

        let payload = item.remote_payload(self.config);
        let pushing = item.remote_id.clone();
        let result = match &pushing {
            Some(remote_id) => self
                .provider
                .update_object(&self.config.container_id, remote_id, &payload)
                .await
                .map(|()| remote_id.clone()),
            None => {
                RemoteResolver::new(self.provider, self.config)
                    .resolve_or_create(&item.id, &payload)
                    .await
            }
        };

        let tx = self.db.transaction()?;
        let mut current = load_item(&SqliteItemRepository::new(&tx), &item.id)?;
        if !same_sync_state(&current, &item) {
            tracing::debug!("Item {} was recorded by another pass", item.id);
            return Ok(SyncOutcome::Unchanged);
        }

        let tracker = SyncStateTracker::new(&tx);
        let outcome = match result {
            Ok(remote_id) => {
                // Edits made while the call was in flight stay unsynced
                tracker.record_success(&mut current, remote_id.clone(), started_at)?;
                if pushing.is_some() {
                    tracing::info!("Pushed local changes of item {} to {remote_id}", item.id);
                    SyncOutcome::Pushed { remote_id }
                } else {
                    SyncOutcome::Synced { remote_id }
                }
            }
            Err(error) => {
                let now = Utc::now().timestamp_millis();
                tracker.record_failure(&mut current, &error.to_string(), now)?;
                tracing::warn!(
                    "Sync of item {} failed (attempt {}): {error}",
                    item.id,
                    current.sync_attempts
                );
                if current.sync_attempts >= policy.max_attempts {
                    SyncOutcome::FailedTerminally {
                        error: Error::AttemptsExceeded {
                            item_id: item.id.to_string(),
                            attempts: current.sync_attempts,
                        }
                        .to_string(),
                    }
                } else if error.is_transient() {
                    SyncOutcome::RetryLater {
                        error: error.to_string(),
                    }
                } else {
                    SyncOutcome::FailedTerminally {
                        error: error.to_string(),
                    }
                }
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Pull the bound remote object and record any drift in the ledger
    async fn verify(&self, item: &Item) -> Result<Option<DriftKind>> {
        let Some(remote_id) = item.remote_id.as_deref() else {
            return Ok(None);
        };

        let observed = match self
            .provider
            .get_object(&self.config.container_id, remote_id)
            .await
        {
            Ok(object) => object.filter(RemoteObject::is_live),
            Err(RemoteError::NotFound(_)) => None,
            Err(error) => {
                tracing::warn!("Verification pull for item {} failed: {error}", item.id);
                return Ok(None);
            }
        };

        let kind = match &observed {
            Some(object) => classify(
                item.status,
                Some(200),
                item.scheduled_at,
                object.start.as_deref(),
                true,
            ),
            None => classify(item.status, Some(404), item.scheduled_at, None, false),
        };
        if kind == DriftKind::TimeMismatch && item.has_local_changes() {
            tracing::debug!("Item {} has a local time not pushed yet", item.id);
            return Ok(None);
        }

        if let Some(draft) = drift_draft(item, kind, observed.as_ref()) {
            let tx = self.db.transaction()?;
            SqliteConflictLedger::new(&tx).open_or_update(&draft)?;
            tx.commit()?;
            tracing::warn!("Item {} drifted: {kind}", item.id);
        }
        Ok(Some(kind))
    }

    /// Feed field values pulled from the remote side into the item
    pub fn ingest_remote_patch(
        &self,
        item_id: &ItemId,
        remote_patch: &Value,
        source: ConflictSource,
        row_ref: Option<&str>,
    ) -> Result<IngestOutcome> {
        ingest_remote_patch(self.db, item_id, remote_patch, source, row_ref)
    }

    /// Close an open conflict and carry out the chosen side
    ///
    /// A kept local value is pushed before the store is touched; a failed
    /// push leaves the conflict open. The ledger row and the item change
    /// then commit together.
    pub async fn apply_resolution(
        &self,
        conflict_id: &ConflictId,
        resolution: Resolution,
    ) -> Result<Conflict> {
        let conflict = open_conflict(&SqliteConflictLedger::new(self.db.connection()), conflict_id)?;
        let item = load_item(
            &SqliteItemRepository::new(self.db.connection()),
            &conflict.item_id,
        )?;

        let pushed_at = Utc::now().timestamp_millis();
        let pushed_to = match (resolution, item.remote_id.clone()) {
            (Resolution::KeepLocal, Some(remote_id)) if conflict.field_name != FIELD_EXISTENCE => {
                let payload = item.remote_payload(self.config);
                self.provider
                    .update_object(&self.config.container_id, &remote_id, &payload)
                    .await?;
                Some(remote_id)
            }
            _ => None,
        };

        let tx = self.db.transaction()?;
        let ledger = SqliteConflictLedger::new(&tx);
        let items = SqliteItemRepository::new(&tx);
        let tracker = SyncStateTracker::new(&tx);

        let conflict = open_conflict(&ledger, conflict_id)?;
        let resolved = ledger.resolve(conflict_id, resolution)?;
        let mut item = load_item(&items, &conflict.item_id)?;

        match resolution {
            Resolution::KeepRemote => {
                if let Some(patch) = &conflict.remote_patch {
                    apply_remote_patch(&mut item, patch)?;
                    persist_remote_change(&items, &tracker, &item)?;
                }
            }
            Resolution::KeepLocal => match pushed_to {
                Some(remote_id) => tracker.record_success(&mut item, remote_id, pushed_at)?,
                // Nothing bound to push to; the next pass creates from local state
                None => tracker.requeue(&mut item)?,
            },
            Resolution::Merged => {}
        }

        tx.commit()?;
        tracing::info!(
            "Applied {resolution} to conflict {conflict_id} on item {}",
            conflict.item_id
        );
        Ok(resolved)
    }
}

/// Feed field values pulled from the remote side into an item
///
/// Items with unsynced local edits get one conflict per differing field;
/// others take the patch directly. No provider call is involved.
pub fn ingest_remote_patch(
    db: &Database,
    item_id: &ItemId,
    remote_patch: &Value,
    source: ConflictSource,
    row_ref: Option<&str>,
) -> Result<IngestOutcome> {
    let tx = db.transaction()?;
    let items = SqliteItemRepository::new(&tx);
    let mut item = load_item(&items, item_id)?;

    let drafts = detect_field_conflicts(&item, remote_patch, source);
    if drafts.is_empty() {
        return Ok(IngestOutcome::Unchanged);
    }

    let outcome = if item.has_local_changes() {
        let ledger = SqliteConflictLedger::new(&tx);
        for draft in &drafts {
            let draft = match row_ref {
                Some(row_ref) => draft.clone().with_row_ref(row_ref),
                None => draft.clone(),
            };
            ledger.open_or_update(&draft)?;
        }
        IngestOutcome::Conflicted {
            fields: drafts.len(),
        }
    } else {
        apply_remote_patch(&mut item, remote_patch)?;
        persist_remote_change(&items, &SyncStateTracker::new(&tx), &item)?;
        IngestOutcome::Applied
    };

    tx.commit()?;
    Ok(outcome)
}

fn load_item(items: &SqliteItemRepository<'_>, item_id: &ItemId) -> Result<Item> {
    items
        .get(item_id)?
        .ok_or_else(|| Error::NotFound(format!("item {item_id}")))
}

fn open_conflict(ledger: &SqliteConflictLedger<'_>, conflict_id: &ConflictId) -> Result<Conflict> {
    ledger
        .get(conflict_id)?
        .filter(Conflict::is_open)
        .ok_or_else(|| Error::NotFound(format!("open conflict {conflict_id}")))
}

/// Whether no sync outcome was recorded between the two reads
fn same_sync_state(current: &Item, read: &Item) -> bool {
    current.remote_id == read.remote_id
        && current.sync_status == read.sync_status
        && current.sync_attempts == read.sync_attempts
        && current.sync_attempted_at == read.sync_attempted_at
}

/// Items the provider should hold an object for
fn wants_remote(item: &Item) -> bool {
    item.status == ItemStatus::Scheduled && item.scheduled_at.is_some()
}

/// Store an item whose local fields took remote values
///
/// A still-bound item is in sync again; a patch that detached it sends it
/// back to the queue.
fn persist_remote_change(
    items: &SqliteItemRepository<'_>,
    tracker: &SyncStateTracker<'_>,
    patched: &Item,
) -> Result<()> {
    let mut stored = items.update(patched)?;
    match patched.remote_id.clone() {
        Some(remote_id) => {
            tracker.record_success(&mut stored, remote_id, Utc::now().timestamp_millis())
        }
        None => tracker.requeue(&mut stored),
    }
}

fn drift_draft(item: &Item, kind: DriftKind, observed: Option<&RemoteObject>) -> Option<ConflictDraft> {
    let field = kind.field_name()?;
    let (local_value, remote_value, patch) = match kind {
        DriftKind::InSync => return None,
        DriftKind::MissingEvent => (
            "expected".to_string(),
            "missing".to_string(),
            status_patch(ItemStatus::Cancelled, true),
        ),
        DriftKind::UnexpectedEvent => {
            let mut patch = status_patch(ItemStatus::Scheduled, false);
            if let Some(start) = observed.and_then(|object| object.start.as_deref()) {
                patch["scheduled_at"] = json!(start);
            }
            ("absent".to_string(), "present".to_string(), patch)
        }
        DriftKind::TimeMismatch => {
            let remote_time = observed
                .and_then(|object| object.start.clone())
                .unwrap_or_default();
            (
                item.scheduled_at
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_default(),
                remote_time.clone(),
                json!({ "scheduled_at": remote_time }),
            )
        }
    };

    Some(
        ConflictDraft::new(
            item.id,
            ConflictSource::CalendarDrift,
            field,
            Some(local_value),
            Some(remote_value),
        )
        .with_remote_patch(patch),
    )
}
