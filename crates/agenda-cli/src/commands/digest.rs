use std::path::Path;

use agenda_core::digest::SyncDigest;

use crate::commands::common::{open_database, preview, short_id};
use crate::error::CliError;

pub fn run_digest(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let digest = SyncDigest::collect(db.connection())?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&digest)?);
        return Ok(());
    }

    for line in format_digest_lines(&digest) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_digest_lines(digest: &SyncDigest) -> Vec<String> {
    let mut lines = vec![format!(
        "items: {} pending, {} synced, {} error",
        digest.counts.pending, digest.counts.synced, digest.counts.error
    )];

    let conflicts = digest
        .open_conflicts
        .iter()
        .map(|(source, count)| format!("{source}={count}"))
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!(
        "open conflicts: {} ({conflicts})",
        digest.total_open_conflicts()
    ));

    for errored in &digest.errored {
        lines.push(format!(
            "  {}  {}  attempts={}  {}",
            short_id(&errored.item_id.to_string()),
            preview(&errored.title, 32),
            errored.attempts,
            errored.error.as_deref().unwrap_or("-")
        ));
    }

    if !digest.needs_attention() {
        lines.push("All clear.".to_string());
    }
    lines
}
