//! Link rows
//!
//! Links are soft-deleted like version rows. They are tombstoned explicitly
//! by unlink, or in bulk by the integrity observer when an endpoint document
//! is deleted, and physically removed only by the vacuum hook once the
//! document they reference has been purged.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::models::{Link, LinkDirection};
use crate::storage::Database;

const LINK_COLUMNS: &str = "id, from_path, to_path, tag, created_at, deleted_at";

/// How many ids to try before giving up on a link insert
const ID_ATTEMPTS: usize = 16;

/// Read access to the link graph
#[derive(Debug, Clone)]
pub struct LinkStore {
    db: Database,
}

impl LinkStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Links touching `path` in the given direction
    pub fn links(
        &self,
        path: &str,
        direction: LinkDirection,
        include_deleted: bool,
    ) -> StoreResult<Vec<Link>> {
        self.db
            .read(|conn| links_for(conn, path, direction, include_deleted))
    }

    /// Document paths with no active link in either direction
    pub fn orphans(&self) -> StoreResult<Vec<String>> {
        self.db.read(orphans)
    }

    /// Every link row, oldest first
    pub fn all(&self, include_deleted: bool) -> StoreResult<Vec<Link>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM links WHERE (?1 OR deleted_at IS NULL) ORDER BY created_at, id",
                LINK_COLUMNS
            ))?;
            let links = stmt
                .query_map(params![include_deleted], row_to_link)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(links)
        })
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn row_to_link(row: &Row) -> rusqlite::Result<Link> {
    let deleted_at: Option<i64> = row.get(5)?;
    Ok(Link {
        id: row.get(0)?,
        from_path: row.get(1)?,
        to_path: row.get(2)?,
        tag: row.get(3)?,
        created_at: millis_to_datetime(row.get(4)?),
        deleted_at: deleted_at.map(millis_to_datetime),
    })
}

fn unused_id(conn: &Connection) -> StoreResult<String> {
    let mut stmt = conn.prepare("SELECT 1 FROM links WHERE id = ?")?;
    for _ in 0..ID_ATTEMPTS {
        let id = keys::generate();
        if !stmt.exists(params![id])? {
            return Ok(id);
        }
    }
    Err(StoreError::KeyExhausted {
        attempts: ID_ATTEMPTS,
    })
}

/// Create a link, rejecting an identical active one
pub(crate) fn insert_link(
    conn: &Connection,
    from: &str,
    to: &str,
    tag: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<Link> {
    let duplicate = conn
        .prepare(
            "SELECT 1 FROM links
             WHERE from_path = ? AND to_path = ? AND tag IS ? AND deleted_at IS NULL",
        )?
        .exists(params![from, to, tag])?;
    if duplicate {
        return Err(StoreError::AlreadyExists {
            path: format!("{} -> {}", from, to),
        });
    }

    let id = unused_id(conn)?;
    conn.execute(
        "INSERT INTO links (id, from_path, to_path, tag, created_at) VALUES (?, ?, ?, ?, ?)",
        params![id, from, to, tag, now.timestamp_millis()],
    )?;

    Ok(Link {
        id,
        from_path: from.to_string(),
        to_path: to.to_string(),
        tag: tag.map(str::to_string),
        created_at: millis_to_datetime(now.timestamp_millis()),
        deleted_at: None,
    })
}

/// Soft-delete active links from `from` to `to`; any tag when `tag` is `None`
pub(crate) fn soft_delete_between(
    conn: &Connection,
    from: &str,
    to: &str,
    tag: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM links
         WHERE from_path = ?1 AND to_path = ?2 AND deleted_at IS NULL
           AND (?3 IS NULL OR tag = ?3)",
    )?;
    let ids = stmt
        .query_map(params![from, to, tag], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    for id in &ids {
        conn.execute(
            "UPDATE links SET deleted_at = ? WHERE id = ?",
            params![now.timestamp_millis(), id],
        )?;
    }
    Ok(ids)
}

/// Soft-delete every active link with `path` at either end
///
/// Repeating the call changes nothing once the links are tombstoned.
pub(crate) fn soft_delete_touching(
    conn: &Connection,
    path: &str,
    now: DateTime<Utc>,
) -> StoreResult<usize> {
    Ok(conn.execute(
        "UPDATE links SET deleted_at = ?1
         WHERE (from_path = ?2 OR to_path = ?2) AND deleted_at IS NULL",
        params![now.timestamp_millis(), path],
    )?)
}

/// Physically remove every link with `path` at either end, live or not
pub(crate) fn purge_touching(conn: &Connection, path: &str) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM links WHERE from_path = ?1 OR to_path = ?1",
        params![path],
    )?)
}

pub(crate) fn links_for(
    conn: &Connection,
    path: &str,
    direction: LinkDirection,
    include_deleted: bool,
) -> StoreResult<Vec<Link>> {
    let endpoint = match direction {
        LinkDirection::Outgoing => "from_path = ?1",
        LinkDirection::Incoming => "to_path = ?1",
        LinkDirection::Both => "(from_path = ?1 OR to_path = ?1)",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM links WHERE {} AND (?2 OR deleted_at IS NULL) ORDER BY created_at, id",
        LINK_COLUMNS, endpoint
    ))?;
    let links = stmt
        .query_map(params![path, include_deleted], row_to_link)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

/// Paths with at least one unvacuumed version row and no active link
///
/// Tombstoned documents are included: deleting a document strips its links,
/// which orphans both it and any neighbour left without other links.
pub(crate) fn orphans(conn: &Connection) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT v.path FROM versions v
        WHERE NOT EXISTS (
            SELECT 1 FROM links l
            WHERE l.deleted_at IS NULL
              AND (l.from_path = v.path OR l.to_path = v.path)
        )
        ORDER BY v.path
        "#,
    )?;
    let paths = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}
