//! Identifier resolution
//!
//! Callers name documents either by path or by the opaque key of one of its
//! versions. An identifier that is not key-length can only be a path. A
//! key-length identifier is looked up both ways, and a key match wins: keys
//! are globally unique, while a path that happens to be eight characters
//! long is merely a coincidence of naming.
//!
//! The result says which interpretation matched, so operations that mean
//! different things for a key (one version) and a path (the whole document)
//! branch on [`Resolved::by_key`] instead of re-deriving the heuristic.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::models::Version;
use crate::storage::{versions, Database};

/// A resolved identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// The row the identifier names: the exact keyed version, or the latest
    /// version of the path
    pub row: Version,
    /// Whether the identifier matched as a key
    pub by_key: bool,
}

impl Resolved {
    /// Canonical document path
    pub fn path(&self) -> &str {
        &self.row.path
    }
}

/// Resolves path-or-key identifiers to concrete version rows
#[derive(Debug, Clone)]
pub struct Resolver {
    db: Database,
}

impl Resolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resolve `identifier` against committed state
    pub fn resolve(&self, identifier: &str, include_deleted: bool) -> StoreResult<Resolved> {
        self.db.read(|conn| resolve_in(conn, identifier, include_deleted))
    }
}

/// Resolve `identifier` on an open connection or transaction
pub(crate) fn resolve_in(
    conn: &Connection,
    identifier: &str,
    include_deleted: bool,
) -> StoreResult<Resolved> {
    if identifier.is_empty() {
        return Err(StoreError::invalid_input("identifier must not be empty"));
    }

    let by_path = versions::latest(conn, identifier, include_deleted)?;

    if keys::is_key_length(identifier) {
        let by_key = versions::by_key(conn, identifier)?
            .filter(|row| include_deleted || !row.is_deleted());

        if let Some(row) = by_key {
            if by_path.is_some() {
                debug!(
                    "'{}' names both a key and a path; resolving as key",
                    identifier
                );
            }
            return Ok(Resolved { row, by_key: true });
        }
    }

    by_path
        .map(|row| Resolved { row, by_key: false })
        .ok_or_else(|| StoreError::not_found(identifier))
}
