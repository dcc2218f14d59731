//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        apply(conn, 2, MIGRATION_V2)?;
    }
    if version < 3 {
        apply(conn, 3, MIGRATION_V3)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn apply(conn: &Connection, version: i32, sql: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} of {CURRENT_VERSION}");
    Ok(())
}

/// Version 1: items
const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'inbox',
        scheduled_at TEXT,
        duration_min INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);
    CREATE INDEX IF NOT EXISTS idx_items_updated ON items(updated_at DESC);
";

/// Version 2: remote binding and sync state
const MIGRATION_V2: &str = "
    ALTER TABLE items ADD COLUMN remote_id TEXT;
    ALTER TABLE items ADD COLUMN remote_parent_id TEXT;
    ALTER TABLE items ADD COLUMN sync_status TEXT NOT NULL DEFAULT 'pending';
    ALTER TABLE items ADD COLUMN sync_attempts INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE items ADD COLUMN sync_error TEXT;
    ALTER TABLE items ADD COLUMN synced_at INTEGER;
    ALTER TABLE items ADD COLUMN sync_attempted_at INTEGER;

    CREATE INDEX IF NOT EXISTS idx_items_remote_id ON items(remote_id);
    CREATE INDEX IF NOT EXISTS idx_items_remote_parent_id ON items(remote_parent_id);
    CREATE INDEX IF NOT EXISTS idx_items_sync_status ON items(sync_status);
";

/// Version 3: conflict ledger
const MIGRATION_V3: &str = "
    CREATE TABLE IF NOT EXISTS conflicts (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL REFERENCES items(id),
        source TEXT NOT NULL,
        field_name TEXT NOT NULL,
        local_value TEXT,
        remote_value TEXT,
        remote_patch_json TEXT,
        status TEXT NOT NULL DEFAULT 'open',
        resolution TEXT,
        row_ref TEXT,
        created_at INTEGER NOT NULL,
        resolved_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_conflicts_item_id ON conflicts(item_id);
    CREATE INDEX IF NOT EXISTS idx_conflicts_source ON conflicts(source);
    CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts(status);
    CREATE UNIQUE INDEX IF NOT EXISTS uq_conflicts_open_item_field
        ON conflicts(item_id, field_name)
        WHERE status = 'open';
";

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_v3_creates_conflicts_table() {
        let conn = setup();
        run(&conn).unwrap();

        assert!(table_exists(&conn, "items"));
        assert!(table_exists(&conn, "conflicts"));
    }

    #[test]
    fn test_open_conflict_unique_per_item_field() {
        let conn = setup();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO items (id, title, created_at, updated_at) VALUES ('i1', 't', 0, 0)",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO conflicts (id, item_id, source, field_name, status, created_at)
                      VALUES (?1, 'i1', 'calendar_drift', 'time', ?2, 0)";

        conn.execute(insert, ["c1", "resolved"]).unwrap();
        conn.execute(insert, ["c2", "open"]).unwrap();
        assert!(conn.execute(insert, ["c3", "open"]).is_err());
    }
}
