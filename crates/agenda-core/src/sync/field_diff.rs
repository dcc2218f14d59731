//! Field-level comparison of a remote patch against a local item.
//!
//! A patch is a JSON object carrying any of `title`, `description`,
//! `scheduled_at`, `status` and `remote_id`. `null` clears the field.

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::{ConflictDraft, ConflictSource, Item, ItemStatus};
use crate::util::{format_timestamp, normalize_text_option, parse_timestamp};

/// Fields a pulled remote patch may dispute
pub const PULLED_FIELDS: [&str; 4] = ["title", "description", "scheduled_at", "status"];

/// One draft per pulled field whose remote value differs from the item
pub fn detect_field_conflicts(
    item: &Item,
    remote_patch: &Value,
    source: ConflictSource,
) -> Vec<ConflictDraft> {
    let Some(patch) = remote_patch.as_object() else {
        return Vec::new();
    };

    PULLED_FIELDS
        .iter()
        .filter_map(|field| {
            let remote = patch.get(*field)?;
            let local_value = local_field(item, field);
            let remote_value = patch_text(remote);
            if same_value(field, local_value.as_deref(), remote_value.as_deref()) {
                return None;
            }
            let mut field_patch = Map::new();
            field_patch.insert((*field).to_string(), remote.clone());
            Some(
                ConflictDraft::new(item.id, source, *field, local_value, remote_value)
                    .with_remote_patch(Value::Object(field_patch)),
            )
        })
        .collect()
}

/// Apply a remote patch to the item's local fields
///
/// `"remote_id": null` detaches the item from its remote object. Unknown keys
/// are ignored.
pub fn apply_remote_patch(item: &mut Item, remote_patch: &Value) -> Result<()> {
    let patch = remote_patch
        .as_object()
        .ok_or_else(|| Error::InvalidInput(format!("remote patch must be an object: {remote_patch}")))?;

    if let Some(title) = patch.get("title") {
        item.title = patch_text(title)
            .ok_or_else(|| Error::InvalidInput("remote patch clears the title".to_string()))?;
    }
    if let Some(description) = patch.get("description") {
        item.description = patch_text(description);
    }
    if let Some(scheduled_at) = patch.get("scheduled_at") {
        item.scheduled_at = match patch_text(scheduled_at) {
            Some(raw) => Some(parse_timestamp(&raw).ok_or_else(|| {
                Error::InvalidInput(format!("invalid scheduled_at in remote patch: {raw}"))
            })?),
            None => None,
        };
    }
    if let Some(status) = patch.get("status") {
        let raw = patch_text(status)
            .ok_or_else(|| Error::InvalidInput("remote patch clears the status".to_string()))?;
        item.status = raw.parse()?;
    }
    if patch.get("remote_id").is_some_and(Value::is_null) {
        item.remote_id = None;
        item.remote_parent_id = None;
    }
    Ok(())
}

fn local_field(item: &Item, field: &str) -> Option<String> {
    match field {
        "title" => Some(item.title.clone()),
        "description" => item.description.clone(),
        "scheduled_at" => item.scheduled_at.as_ref().map(format_timestamp),
        "status" => Some(item.status.as_str().to_string()),
        _ => None,
    }
}

fn patch_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => normalize_text_option(Some(text.clone())),
        other => Some(other.to_string()),
    }
}

fn same_value(field: &str, local: Option<&str>, remote: Option<&str>) -> bool {
    match (local, remote) {
        (None, None) => true,
        (Some(local), Some(remote)) => match field {
            "scheduled_at" => match (parse_timestamp(local), parse_timestamp(remote)) {
                (Some(local), Some(remote)) => local == remote,
                _ => local == remote,
            },
            "status" => match (local.parse::<ItemStatus>(), remote.parse::<ItemStatus>()) {
                (Ok(local), Ok(remote)) => local == remote,
                _ => local == remote,
            },
            _ => local.trim() == remote.trim(),
        },
        _ => false,
    }
}

/// Patch that, applied with [`apply_remote_patch`], moves the item to `status`
pub(crate) fn status_patch(status: ItemStatus, detach: bool) -> Value {
    if detach {
        json!({ "status": status.as_str(), "remote_id": null })
    } else {
        json!({ "status": status.as_str() })
    }
}
