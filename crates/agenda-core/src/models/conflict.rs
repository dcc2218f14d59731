//! Conflict ledger model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ItemId;
use crate::error::Error;

/// Field name used for existence disagreements (missing or unexpected remote object)
pub const FIELD_EXISTENCE: &str = "existence";
/// Field name used for start time disagreements
pub const FIELD_TIME: &str = "time";

/// A unique identifier for a conflict row, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where a disputed value was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSource {
    /// Verification pull against the calendar (existence/time drift)
    CalendarDrift,
    /// Field changes pulled from the remote task list
    TasksPull,
}

impl ConflictSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CalendarDrift => "calendar_drift",
            Self::TasksPull => "tasks_pull",
        }
    }
}

impl fmt::Display for ConflictSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "calendar_drift" => Ok(Self::CalendarDrift),
            "tasks_pull" => Ok(Self::TasksPull),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict source: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

impl ConflictStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for ConflictStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict status: {other}"
            ))),
        }
    }
}

/// Operator decision recorded when a conflict is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    Merged,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::Merged => "merged",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_local" | "local" => Ok(Self::KeepLocal),
            "keep_remote" | "accept_remote" | "remote" => Ok(Self::KeepRemote),
            "merged" | "merge" => Ok(Self::Merged),
            other => Err(Error::InvalidInput(format!("unsupported resolution: {other}"))),
        }
    }
}

/// A field-scoped disagreement between local and remote state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    /// Owning item
    pub item_id: ItemId,
    pub source: ConflictSource,
    pub field_name: String,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
    /// Remote mutation to replay if the remote value wins
    pub remote_patch: Option<Value>,
    pub status: ConflictStatus,
    pub resolution: Option<Resolution>,
    /// Pointer to a presentation row for operator review
    pub row_ref: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: Option<i64>,
}

impl Conflict {
    pub const fn is_open(&self) -> bool {
        matches!(self.status, ConflictStatus::Open)
    }
}

/// Values measured for a divergence, before they reach the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDraft {
    pub item_id: ItemId,
    pub source: ConflictSource,
    pub field_name: String,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
    pub remote_patch: Option<Value>,
    pub row_ref: Option<String>,
}

impl ConflictDraft {
    pub fn new(
        item_id: ItemId,
        source: ConflictSource,
        field_name: impl Into<String>,
        local_value: Option<String>,
        remote_value: Option<String>,
    ) -> Self {
        Self {
            item_id,
            source,
            field_name: field_name.into(),
            local_value,
            remote_value,
            remote_patch: None,
            row_ref: None,
        }
    }

    #[must_use]
    pub fn with_remote_patch(mut self, patch: Value) -> Self {
        self.remote_patch = Some(patch);
        self
    }

    #[must_use]
    pub fn with_row_ref(mut self, row_ref: impl Into<String>) -> Self {
        self.row_ref = Some(row_ref.into());
        self
    }
}

/// Ledger query filter; `None` fields match everything
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictFilter {
    pub source: Option<ConflictSource>,
    pub status: Option<ConflictStatus>,
    pub limit: Option<usize>,
}

impl ConflictFilter {
    /// Open conflicts only, any source
    pub const fn open() -> Self {
        Self {
            source: None,
            status: Some(ConflictStatus::Open),
            limit: None,
        }
    }

    #[must_use]
    pub const fn with_source(mut self, source: ConflictSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
