//! Item model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::Error;
use crate::util::format_timestamp;

/// A unique identifier for an item, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Create a new unique item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of an item as the user sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Captured but not yet planned
    #[default]
    Inbox,
    /// Being worked on without a fixed slot
    Active,
    /// Has a calendar slot and should be mirrored remotely
    Scheduled,
    Done,
    Failed,
    Cancelled,
}

impl ItemStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Active => "active",
            Self::Scheduled => "scheduled",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status requires a live remote counterpart
    pub const fn expects_remote(self) -> bool {
        matches!(self, Self::Scheduled)
    }

    /// Whether this status forbids a live remote counterpart
    pub const fn forbids_remote(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbox" => Ok(Self::Inbox),
            "active" => Ok(Self::Active),
            "scheduled" => Ok(Self::Scheduled),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown item status: {other}"))),
        }
    }
}

/// Mirror state of an item relative to the remote provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" | "failed" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("unknown sync status: {other}"))),
        }
    }
}

/// Fields needed to create a new item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub status: ItemStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_min: Option<u32>,
}

impl NewItem {
    /// A scheduled item with the given title and start time
    pub fn scheduled(title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            status: ItemStatus::Scheduled,
            scheduled_at: Some(at),
            ..Self::default()
        }
    }
}

/// A task or goal tracked locally and optionally mirrored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub status: ItemStatus,
    /// Expected start of the remote event
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_min: Option<u32>,
    /// Bound remote object, if any
    pub remote_id: Option<String>,
    pub remote_parent_id: Option<String>,
    pub sync_status: SyncStatus,
    /// Failed resolve/write attempts so far
    pub sync_attempts: u32,
    /// Last failure message, cleared on success
    pub sync_error: Option<String>,
    /// Last successful reconciliation (Unix ms)
    pub synced_at: Option<i64>,
    /// Last resolve attempt, successful or not (Unix ms)
    pub sync_attempted_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local edit (Unix ms)
    pub updated_at: i64,
}

impl Item {
    /// Create a new, never-synced item
    #[must_use]
    pub fn new(new_item: NewItem) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: ItemId::new(),
            title: new_item.title,
            description: new_item.description,
            status: new_item.status,
            scheduled_at: new_item.scheduled_at,
            duration_min: new_item.duration_min,
            remote_id: None,
            remote_parent_id: None,
            sync_status: SyncStatus::Pending,
            sync_attempts: 0,
            sync_error: None,
            synced_at: None,
            sync_attempted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the binding invariant: a pending item never holds a remote id
    pub const fn has_consistent_binding(&self) -> bool {
        match self.sync_status {
            SyncStatus::Pending => self.remote_id.is_none(),
            SyncStatus::Synced => self.remote_id.is_some(),
            SyncStatus::Error => true,
        }
    }

    /// Local edits made after the last successful reconciliation
    pub fn has_local_changes(&self) -> bool {
        match self.sync_status {
            SyncStatus::Pending | SyncStatus::Error => true,
            SyncStatus::Synced => self
                .synced_at
                .is_some_and(|synced_at| self.updated_at > synced_at),
        }
    }

    /// Build the payload the remote object should carry
    pub fn remote_payload(&self, config: &SyncConfig) -> Value {
        let mut payload = json!({ "summary": self.title });

        if let Some(description) = &self.description {
            payload["description"] = json!(description);
        }

        if let Some(start) = self.scheduled_at {
            let minutes = self.duration_min.unwrap_or(config.default_duration_min);
            let end = start + Duration::minutes(i64::from(minutes));
            payload["start"] = json!({
                "dateTime": format_timestamp(&start),
                "timeZone": config.timezone,
            });
            payload["end"] = json!({
                "dateTime": format_timestamp(&end),
                "timeZone": config.timezone,
            });
        }

        payload
    }
}
