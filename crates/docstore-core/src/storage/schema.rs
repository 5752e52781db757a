//! SQLite schema for versions, lineages and links
//!
//! Version rows and link rows live in the same database so a single backup
//! captures a consistent cut across both.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Immutable version rows; only path and deleted_at ever change
        CREATE TABLE IF NOT EXISTS versions (
            path TEXT NOT NULL,
            version INTEGER NOT NULL,
            key TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            author TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            deleted_at INTEGER,
            PRIMARY KEY (path, version)
        );

        -- Highest version number issued to each live lineage
        CREATE TABLE IF NOT EXISTS lineages (
            path TEXT PRIMARY KEY,
            head INTEGER NOT NULL
        );

        -- Relationship edges between document paths
        CREATE TABLE IF NOT EXISTS links (
            id TEXT PRIMARY KEY,
            from_path TEXT NOT NULL,
            to_path TEXT NOT NULL,
            tag TEXT,
            created_at INTEGER NOT NULL,
            deleted_at INTEGER
        );

        -- Indexes for common query patterns

        -- Vacuum selection
        CREATE INDEX IF NOT EXISTS idx_versions_deleted_at ON versions(deleted_at);

        -- Link lookups by either endpoint
        CREATE INDEX IF NOT EXISTS idx_links_from_path ON links(from_path);
        CREATE INDEX IF NOT EXISTS idx_links_to_path ON links(to_path);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
