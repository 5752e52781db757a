//! Version rows
//!
//! `VersionStore` is the public read/write contract over the `versions` and
//! `lineages` tables. The free functions below are the transaction-scoped
//! primitives it is built from; the lifecycle engine and the vacuum compose
//! them inside their own transactions.
//!
//! Version numbers come from the `lineages` table rather than from
//! `MAX(version)`, so a number is never handed out twice while the lineage
//! exists, even after an individual tombstoned row has been vacuumed.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::models::{DocumentState, Version};
use crate::storage::Database;

/// How many keys to try before giving up on a write
const KEY_ATTEMPTS: usize = 16;

const VERSION_COLUMNS: &str =
    "path, version, key, content, author, message, created_at, deleted_at";

/// Public read/write contract over version rows
#[derive(Debug, Clone)]
pub struct VersionStore {
    db: Database,
}

impl VersionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a new version to `path` in its own transaction
    pub fn write(
        &self,
        path: &str,
        content: &str,
        author: &str,
        message: &str,
    ) -> StoreResult<Version> {
        self.db
            .write(|tx| insert_version(tx, path, content, author, message, Utc::now()))
    }

    /// Highest-numbered row of `path`
    ///
    /// Without `include_deleted` this is `NotFound` whenever the highest row
    /// is tombstoned, even if lower rows are still live.
    pub fn latest(&self, path: &str, include_deleted: bool) -> StoreResult<Version> {
        self.db
            .read(|conn| latest(conn, path, include_deleted))?
            .ok_or_else(|| StoreError::not_found(path))
    }

    /// A specific version of `path`
    pub fn version(&self, path: &str, version: u32, include_deleted: bool) -> StoreResult<Version> {
        self.db
            .read(|conn| version_of(conn, path, version, include_deleted))?
            .ok_or_else(|| StoreError::not_found(format!("{} v{}", path, version)))
    }

    /// The row named by `key`, tombstoned or not
    pub fn by_key(&self, key: &str) -> StoreResult<Version> {
        self.db
            .read(|conn| by_key(conn, key))?
            .ok_or_else(|| StoreError::not_found(key))
    }

    /// Every row of `path` in ascending version order
    pub fn history(&self, path: &str, include_deleted: bool) -> StoreResult<Vec<Version>> {
        self.db.read(|conn| history(conn, path, include_deleted))
    }

    /// Latest row of every path under `prefix`
    pub fn list(&self, prefix: &str, include_deleted: bool) -> StoreResult<Vec<Version>> {
        self.db.read(|conn| list_latest(conn, prefix, include_deleted))
    }

    /// Lifecycle state of `path`
    pub fn state(&self, path: &str) -> StoreResult<DocumentState> {
        self.db.read(|conn| state(conn, path))
    }
}

// ==================== Row mapping ====================

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn row_to_version(row: &Row) -> rusqlite::Result<Version> {
    let deleted_at: Option<i64> = row.get(7)?;
    Ok(Version {
        path: row.get(0)?,
        version: row.get(1)?,
        key: row.get(2)?,
        content: row.get(3)?,
        author: row.get(4)?,
        message: row.get(5)?,
        created_at: millis_to_datetime(row.get(6)?),
        deleted_at: deleted_at.map(millis_to_datetime),
    })
}

fn live_only(row: Option<Version>, include_deleted: bool) -> Option<Version> {
    row.filter(|v| include_deleted || !v.is_deleted())
}

// ==================== Reads ====================

pub(crate) fn latest(
    conn: &Connection,
    path: &str,
    include_deleted: bool,
) -> StoreResult<Option<Version>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM versions WHERE path = ? ORDER BY version DESC LIMIT 1",
                VERSION_COLUMNS
            ),
            params![path],
            row_to_version,
        )
        .optional()?;
    Ok(live_only(row, include_deleted))
}

pub(crate) fn version_of(
    conn: &Connection,
    path: &str,
    version: u32,
    include_deleted: bool,
) -> StoreResult<Option<Version>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM versions WHERE path = ? AND version = ?",
                VERSION_COLUMNS
            ),
            params![path, version],
            row_to_version,
        )
        .optional()?;
    Ok(live_only(row, include_deleted))
}

pub(crate) fn by_key(conn: &Connection, key: &str) -> StoreResult<Option<Version>> {
    conn.query_row(
        &format!("SELECT {} FROM versions WHERE key = ?", VERSION_COLUMNS),
        params![key],
        row_to_version,
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn history(
    conn: &Connection,
    path: &str,
    include_deleted: bool,
) -> StoreResult<Vec<Version>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM versions WHERE path = ?1 AND (?2 OR deleted_at IS NULL) ORDER BY version",
        VERSION_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![path, include_deleted], row_to_version)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn list_latest(
    conn: &Connection,
    prefix: &str,
    include_deleted: bool,
) -> StoreResult<Vec<Version>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM versions v
        WHERE substr(v.path, 1, length(?1)) = ?1
          AND v.version = (SELECT MAX(version) FROM versions WHERE path = v.path)
          AND (?2 OR v.deleted_at IS NULL)
        ORDER BY v.path
        "#,
        VERSION_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![prefix, include_deleted], row_to_version)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn state(conn: &Connection, path: &str) -> StoreResult<DocumentState> {
    let (head, live): (Option<u32>, Option<i64>) = conn.query_row(
        "SELECT MAX(version), SUM(deleted_at IS NULL) FROM versions WHERE path = ?",
        params![path],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(match head {
        None => DocumentState::Nonexistent,
        Some(head) if live.unwrap_or(0) > 0 => DocumentState::Active { head },
        Some(head) => DocumentState::Deleted { head },
    })
}

/// Whether any row (live or tombstoned) exists for `path`
pub(crate) fn path_exists(conn: &Connection, path: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM versions WHERE path = ? LIMIT 1")?;
    Ok(stmt.exists(params![path])?)
}

/// Every path under `prefix` with at least one live row
pub(crate) fn active_paths_under(conn: &Connection, prefix: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT path FROM versions
        WHERE substr(path, 1, length(?1)) = ?1
        GROUP BY path
        HAVING SUM(deleted_at IS NULL) > 0
        ORDER BY path
        "#,
    )?;
    let paths = stmt
        .query_map(params![prefix], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}

// ==================== Writes ====================

fn next_version(conn: &Connection, path: &str) -> StoreResult<u32> {
    let head: u32 = conn.query_row(
        r#"
        SELECT MAX(
            COALESCE((SELECT head FROM lineages WHERE path = ?1), 0),
            COALESCE((SELECT MAX(version) FROM versions WHERE path = ?1), 0)
        )
        "#,
        params![path],
        |row| row.get(0),
    )?;
    Ok(head + 1)
}

fn unused_key(conn: &Connection) -> StoreResult<String> {
    let mut stmt = conn.prepare("SELECT 1 FROM versions WHERE key = ?")?;
    for _ in 0..KEY_ATTEMPTS {
        let key = keys::generate();
        if !stmt.exists(params![key])? {
            return Ok(key);
        }
        tracing::debug!("Key collision on {}, retrying", key);
    }
    Err(StoreError::KeyExhausted {
        attempts: KEY_ATTEMPTS,
    })
}

/// Append the next version of `path`, creating its lineage if needed
pub(crate) fn insert_version(
    conn: &Connection,
    path: &str,
    content: &str,
    author: &str,
    message: &str,
    now: DateTime<Utc>,
) -> StoreResult<Version> {
    let version = next_version(conn, path)?;
    let key = unused_key(conn)?;

    conn.execute(
        r#"
        INSERT INTO versions (path, version, key, content, author, message, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            path,
            version,
            key,
            content,
            author,
            message,
            now.timestamp_millis()
        ],
    )?;
    conn.execute(
        r#"
        INSERT INTO lineages (path, head) VALUES (?1, ?2)
        ON CONFLICT(path) DO UPDATE SET head = excluded.head
        "#,
        params![path, version],
    )?;

    Ok(Version {
        path: path.to_string(),
        version,
        key,
        content: content.to_string(),
        author: author.to_string(),
        message: message.to_string(),
        created_at: millis_to_datetime(now.timestamp_millis()),
        deleted_at: None,
    })
}

/// Tombstone every live row of `path` with one timestamp
pub(crate) fn tombstone_all(conn: &Connection, path: &str, at: DateTime<Utc>) -> StoreResult<usize> {
    Ok(conn.execute(
        "UPDATE versions SET deleted_at = ? WHERE path = ? AND deleted_at IS NULL",
        params![at.timestamp_millis(), path],
    )?)
}

/// Tombstone a single live row
pub(crate) fn tombstone_one(
    conn: &Connection,
    path: &str,
    version: u32,
    at: DateTime<Utc>,
) -> StoreResult<usize> {
    Ok(conn.execute(
        "UPDATE versions SET deleted_at = ? WHERE path = ? AND version = ? AND deleted_at IS NULL",
        params![at.timestamp_millis(), path, version],
    )?)
}

/// Clear the tombstone on every row of `path`
pub(crate) fn untombstone_all(conn: &Connection, path: &str) -> StoreResult<usize> {
    Ok(conn.execute(
        "UPDATE versions SET deleted_at = NULL WHERE path = ? AND deleted_at IS NOT NULL",
        params![path],
    )?)
}

/// Rewrite the path of every row (and the lineage) from `from` to `to`
pub(crate) fn rename(conn: &Connection, from: &str, to: &str) -> StoreResult<usize> {
    let moved = conn.execute(
        "UPDATE versions SET path = ? WHERE path = ?",
        params![to, from],
    )?;
    conn.execute("DELETE FROM lineages WHERE path = ?", params![to])?;
    conn.execute(
        "UPDATE lineages SET path = ? WHERE path = ?",
        params![to, from],
    )?;
    Ok(moved)
}

// ==================== Purge ====================

/// Paths under `prefix` with tombstoned rows deleted at or before `cutoff`
pub(crate) fn purge_candidates(
    conn: &Connection,
    prefix: &str,
    cutoff: Option<DateTime<Utc>>,
) -> StoreResult<Vec<String>> {
    let cutoff = cutoff.map(|c| c.timestamp_millis()).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT path FROM versions
        WHERE deleted_at IS NOT NULL
          AND deleted_at <= ?2
          AND substr(path, 1, length(?1)) = ?1
        ORDER BY path
        "#,
    )?;
    let paths = stmt
        .query_map(params![prefix, cutoff], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}

/// Result of purging one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Purge {
    /// Rows physically removed
    pub removed: usize,
    /// Whether no rows remain for the path
    pub fully_purged: bool,
}

/// Physically remove tombstoned rows of `path` deleted at or before `cutoff`
///
/// The filter is re-applied here so a row restored after candidate
/// selection is left alone.
pub(crate) fn purge_path(
    conn: &Connection,
    path: &str,
    cutoff: Option<DateTime<Utc>>,
) -> StoreResult<Purge> {
    let cutoff = cutoff.map(|c| c.timestamp_millis()).unwrap_or(i64::MAX);
    let removed = conn.execute(
        "DELETE FROM versions WHERE path = ? AND deleted_at IS NOT NULL AND deleted_at <= ?",
        params![path, cutoff],
    )?;

    let fully_purged = removed > 0 && !path_exists(conn, path)?;
    if fully_purged {
        conn.execute("DELETE FROM lineages WHERE path = ?", params![path])?;
    }

    Ok(Purge {
        removed,
        fully_purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (Database, VersionStore) {
        let db = Database::open_in_memory().unwrap();
        let store = VersionStore::new(db.clone());
        (db, store)
    }

    #[test]
    fn test_write_numbers_from_one() {
        let (_db, store) = store();

        let v1 = store.write("docs/a", "one", "alice", "").unwrap();
        let v2 = store.write("docs/a", "two", "alice", "second").unwrap();
        let other = store.write("docs/b", "other", "bob", "").unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(other.version, 1);
        assert_eq!(v2.message, "second");
        assert_ne!(v1.key, v2.key);
        assert_eq!(v1.key.len(), keys::KEY_LENGTH);
    }

    #[test]
    fn test_latest_and_version() {
        let (_db, store) = store();
        store.write("docs/a", "one", "alice", "").unwrap();
        store.write("docs/a", "two", "alice", "").unwrap();

        assert_eq!(store.latest("docs/a", false).unwrap().content, "two");
        assert_eq!(store.version("docs/a", 1, false).unwrap().content, "one");
        assert!(matches!(
            store.version("docs/a", 3, true),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.latest("docs/missing", true),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_latest_hides_tombstoned_head() {
        let (db, store) = store();
        store.write("docs/a", "one", "alice", "").unwrap();
        store.write("docs/a", "two", "alice", "").unwrap();

        db.write(|tx| tombstone_one(tx, "docs/a", 2, Utc::now()))
            .unwrap();

        assert!(store.latest("docs/a", false).is_err());
        assert_eq!(store.latest("docs/a", true).unwrap().version, 2);
        // Lower rows stay individually queryable
        assert_eq!(store.version("docs/a", 1, false).unwrap().content, "one");
        assert_eq!(store.state("docs/a").unwrap(), DocumentState::Active { head: 2 });
    }

    #[test]
    fn test_by_key() {
        let (_db, store) = store();
        let v1 = store.write("docs/a", "one", "alice", "").unwrap();
        store.write("docs/a", "two", "alice", "").unwrap();

        let found = store.by_key(&v1.key).unwrap();
        assert_eq!(found.version, 1);
        assert_eq!(found.content, "one");
        assert!(store.by_key("zzzzzzzz").is_err());
    }

    #[test]
    fn test_state_transitions() {
        let (db, store) = store();
        assert_eq!(store.state("docs/a").unwrap(), DocumentState::Nonexistent);

        store.write("docs/a", "one", "alice", "").unwrap();
        assert_eq!(store.state("docs/a").unwrap(), DocumentState::Active { head: 1 });

        db.write(|tx| tombstone_all(tx, "docs/a", Utc::now())).unwrap();
        assert_eq!(store.state("docs/a").unwrap(), DocumentState::Deleted { head: 1 });

        db.write(|tx| untombstone_all(tx, "docs/a")).unwrap();
        assert_eq!(store.state("docs/a").unwrap(), DocumentState::Active { head: 1 });
    }

    #[test]
    fn test_history_filters_tombstones() {
        let (db, store) = store();
        for content in ["one", "two", "three"] {
            store.write("docs/a", content, "alice", "").unwrap();
        }
        db.write(|tx| tombstone_one(tx, "docs/a", 2, Utc::now()))
            .unwrap();

        let live: Vec<u32> = store
            .history("docs/a", false)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(live, vec![1, 3]);
        assert_eq!(store.history("docs/a", true).unwrap().len(), 3);
    }

    #[test]
    fn test_list_latest_by_prefix() {
        let (db, store) = store();
        store.write("docs/a", "a1", "alice", "").unwrap();
        store.write("docs/a", "a2", "alice", "").unwrap();
        store.write("docs/b", "b1", "alice", "").unwrap();
        store.write("notes/c", "c1", "alice", "").unwrap();
        db.write(|tx| tombstone_all(tx, "docs/b", Utc::now())).unwrap();

        let docs = store.list("docs/", false).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "a2");

        let with_deleted = store.list("docs/", true).unwrap();
        assert_eq!(with_deleted.len(), 2);

        assert_eq!(store.list("", false).unwrap().len(), 2);
    }

    #[test]
    fn test_prefix_is_literal() {
        let (_db, store) = store();
        store.write("100%_done", "x", "alice", "").unwrap();
        store.write("100-other", "y", "alice", "").unwrap();

        let matched = store.list("100%", false).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].path, "100%_done");
    }

    #[test]
    fn test_rename_preserves_rows_and_lineage() {
        let (db, store) = store();
        store.write("docs/a", "one", "alice", "m1").unwrap();
        store.write("docs/a", "two", "bob", "m2").unwrap();

        db.write(|tx| rename(tx, "docs/a", "docs/z")).unwrap();

        assert_eq!(store.state("docs/a").unwrap(), DocumentState::Nonexistent);
        let moved = store.history("docs/z", true).unwrap();
        assert_eq!(moved.len(), 2);
        assert_eq!(moved[1].author, "bob");
        assert_eq!(moved[1].message, "m2");

        assert_eq!(store.write("docs/z", "three", "alice", "").unwrap().version, 3);
    }

    #[test]
    fn test_version_numbers_survive_partial_purge() {
        let (db, store) = store();
        store.write("docs/a", "one", "alice", "").unwrap();
        store.write("docs/a", "two", "alice", "").unwrap();

        db.write(|tx| tombstone_one(tx, "docs/a", 2, Utc::now()))
            .unwrap();
        let purge = db.write(|tx| purge_path(tx, "docs/a", None)).unwrap();
        assert_eq!(purge.removed, 1);
        assert!(!purge.fully_purged);

        // Version 2 is gone but its number is not reused
        assert_eq!(store.write("docs/a", "three", "alice", "").unwrap().version, 3);
    }

    #[test]
    fn test_full_purge_forgets_lineage() {
        let (db, store) = store();
        store.write("docs/a", "one", "alice", "").unwrap();
        store.write("docs/a", "two", "alice", "").unwrap();

        db.write(|tx| tombstone_all(tx, "docs/a", Utc::now())).unwrap();
        let purge = db.write(|tx| purge_path(tx, "docs/a", None)).unwrap();
        assert_eq!(purge.removed, 2);
        assert!(purge.fully_purged);

        assert_eq!(store.write("docs/a", "fresh", "alice", "").unwrap().version, 1);
    }

    #[test]
    fn test_purge_respects_cutoff() {
        let (db, store) = store();
        store.write("docs/old", "x", "alice", "").unwrap();
        store.write("docs/new", "y", "alice", "").unwrap();

        let now = Utc::now();
        db.write(|tx| tombstone_all(tx, "docs/old", now - Duration::days(10)))
            .unwrap();
        db.write(|tx| tombstone_all(tx, "docs/new", now)).unwrap();

        let cutoff = Some(now - Duration::days(7));
        let candidates = db.read(|conn| purge_candidates(conn, "", cutoff)).unwrap();
        assert_eq!(candidates, vec!["docs/old".to_string()]);

        let purge = db.write(|tx| purge_path(tx, "docs/new", cutoff)).unwrap();
        assert_eq!(purge.removed, 0);
        assert!(!purge.fully_purged);
    }

    #[test]
    fn test_restore_after_selection_survives_purge() {
        let (db, store) = store();
        store.write("docs/a", "one", "alice", "").unwrap();
        store.write("docs/a", "two", "alice", "").unwrap();
        db.write(|tx| tombstone_all(tx, "docs/a", Utc::now())).unwrap();

        let candidates = db.read(|conn| purge_candidates(conn, "", None)).unwrap();
        assert_eq!(candidates, vec!["docs/a".to_string()]);

        db.write(|tx| untombstone_all(tx, "docs/a")).unwrap();

        let purge = db.write(|tx| purge_path(tx, "docs/a", None)).unwrap();
        assert_eq!(purge.removed, 0);
        assert!(!purge.fully_purged);

        let rows = store.history("docs/a", false).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(store.state("docs/a").unwrap().is_active());
    }

    #[test]
    fn test_active_paths_under() {
        let (db, store) = store();
        store.write("docs/a", "x", "alice", "").unwrap();
        store.write("docs/b", "x", "alice", "").unwrap();
        store.write("docs/sub/c", "x", "alice", "").unwrap();
        store.write("other", "x", "alice", "").unwrap();
        db.write(|tx| tombstone_all(tx, "docs/b", Utc::now())).unwrap();

        let paths = db.read(|conn| active_paths_under(conn, "docs/")).unwrap();
        assert_eq!(paths, vec!["docs/a".to_string(), "docs/sub/c".to_string()]);
    }
}
