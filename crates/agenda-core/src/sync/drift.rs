//! Drift classification between the locally expected remote state and the
//! last observation of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ItemStatus, FIELD_EXISTENCE, FIELD_TIME};
use crate::util::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    InSync,
    /// Local item expects a remote object that is gone
    MissingEvent,
    /// Remote object exists for an item that should have none
    UnexpectedEvent,
    /// Both sides have the object but disagree on its start
    TimeMismatch,
}

impl DriftKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::MissingEvent => "missing_event",
            Self::UnexpectedEvent => "unexpected_event",
            Self::TimeMismatch => "time_mismatch",
        }
    }

    /// Ledger field a drift of this kind is recorded under
    pub const fn field_name(self) -> Option<&'static str> {
        match self {
            Self::InSync => None,
            Self::MissingEvent | Self::UnexpectedEvent => Some(FIELD_EXISTENCE),
            Self::TimeMismatch => Some(FIELD_TIME),
        }
    }

    pub const fn is_in_sync(self) -> bool {
        matches!(self, Self::InSync)
    }
}

impl std::fmt::Display for DriftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one observation; the first matching rule wins
///
/// `remote_code` is the status the provider answered the verification pull
/// with. An absent object only counts as missing when the provider said so
/// (404/410) or no status is known at all; any other failure is not drift.
/// A remote start that cannot be parsed is treated as a mismatch.
pub fn classify(
    local_status: ItemStatus,
    remote_code: Option<u16>,
    local_time: Option<DateTime<Utc>>,
    remote_time: Option<&str>,
    remote_exists: bool,
) -> DriftKind {
    let reported_missing =
        !remote_exists && remote_code.is_none_or(|code| matches!(code, 404 | 410));

    if local_status.expects_remote() && reported_missing {
        return DriftKind::MissingEvent;
    }

    if local_status.forbids_remote() && remote_exists {
        return DriftKind::UnexpectedEvent;
    }

    if local_status.expects_remote() && remote_exists {
        if let (Some(local_time), Some(remote_time)) = (local_time, remote_time) {
            let matches = parse_timestamp(remote_time).is_some_and(|remote| remote == local_time);
            if !matches {
                return DriftKind::TimeMismatch;
            }
        }
    }

    DriftKind::InSync
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn decision_table() {
        let same = "2026-03-01T10:00:00Z";
        let other = "2026-03-01T11:30:00Z";
        let cases = [
            // (status, code, local time, remote time, exists, expected)
            (ItemStatus::Scheduled, Some(404), Some(t1()), None, false, DriftKind::MissingEvent),
            (ItemStatus::Scheduled, Some(200), Some(t1()), Some(same), true, DriftKind::InSync),
            (ItemStatus::Scheduled, Some(200), Some(t1()), Some(other), true, DriftKind::TimeMismatch),
            (ItemStatus::Scheduled, Some(200), None, Some(other), true, DriftKind::InSync),
            (ItemStatus::Scheduled, Some(200), Some(t1()), None, true, DriftKind::InSync),
            (ItemStatus::Done, Some(200), Some(t1()), Some(other), true, DriftKind::UnexpectedEvent),
            (ItemStatus::Cancelled, Some(404), Some(t1()), None, false, DriftKind::InSync),
            (ItemStatus::Failed, Some(200), None, None, true, DriftKind::UnexpectedEvent),
            (ItemStatus::Active, Some(200), Some(t1()), Some(other), true, DriftKind::InSync),
        ];

        for (status, code, local, remote, exists, expected) in cases {
            assert_eq!(
                classify(status, code, local, remote, exists),
                expected,
                "{status} code={code:?} local={local:?} remote={remote:?} exists={exists}"
            );
        }
    }

    #[test]
    fn missing_remote_never_yields_time_mismatch() {
        for status in [
            ItemStatus::Inbox,
            ItemStatus::Active,
            ItemStatus::Scheduled,
            ItemStatus::Done,
            ItemStatus::Failed,
            ItemStatus::Cancelled,
        ] {
            let kind = classify(status, Some(404), Some(t1()), Some("2030-01-01T00:00:00Z"), false);
            assert_ne!(kind, DriftKind::TimeMismatch);
        }
    }

    #[test]
    fn equal_instants_in_different_offsets_are_in_sync() {
        let kind = classify(
            ItemStatus::Scheduled,
            Some(200),
            Some(t1()),
            Some("2026-03-01T12:00:00+02:00"),
            true,
        );
        assert_eq!(kind, DriftKind::InSync);
    }

    #[test]
    fn unparseable_remote_time_is_mismatch() {
        let kind = classify(ItemStatus::Scheduled, Some(200), Some(t1()), Some("tomorrow"), true);
        assert_eq!(kind, DriftKind::TimeMismatch);
    }

    #[test]
    fn server_error_without_object_is_not_missing() {
        let kind = classify(ItemStatus::Scheduled, Some(503), Some(t1()), None, false);
        assert_eq!(kind, DriftKind::InSync);
    }

    #[test]
    fn field_names() {
        assert_eq!(DriftKind::MissingEvent.field_name(), Some(FIELD_EXISTENCE));
        assert_eq!(DriftKind::UnexpectedEvent.field_name(), Some(FIELD_EXISTENCE));
        assert_eq!(DriftKind::TimeMismatch.field_name(), Some(FIELD_TIME));
        assert_eq!(DriftKind::InSync.field_name(), None);
    }
}
