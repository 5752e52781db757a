//! Link integrity
//!
//! Keeps the link graph consistent with document deletions: when a document
//! becomes fully deleted, every active link touching its path is
//! soft-deleted in one bulk update. Link events are ignored so that the
//! observer never reacts to its own kind of change.

use chrono::Utc;
use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreResult;
use crate::events::{Event, Observer};
use crate::storage::{links, Database, LinkStore};
use crate::vacuum::VacuumHook;

/// Soft-deletes links whose endpoint document was deleted
#[derive(Debug, Clone)]
pub struct LinkIntegrityObserver {
    db: Database,
}

impl LinkIntegrityObserver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Observer for LinkIntegrityObserver {
    fn name(&self) -> &str {
        "link-integrity"
    }

    fn accepts(&self, event: &Event) -> bool {
        matches!(
            event,
            Event::Deleted {
                fully_deleted: true,
                ..
            }
        )
    }

    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        if let Event::Deleted { path, .. } = event {
            let touched = self
                .db
                .write(|tx| links::soft_delete_touching(tx, path, Utc::now()))?;
            if touched > 0 {
                debug!("Soft-deleted {} link(s) touching '{}'", touched, path);
            }
        }
        Ok(())
    }
}

/// Drops every link of a purged path, including links the observer never
/// got to soft-delete, so a later lineage at the same path starts unlinked
impl VacuumHook for LinkStore {
    fn name(&self) -> &str {
        "links"
    }

    fn on_purged(&self, conn: &Connection, path: &str) -> StoreResult<usize> {
        links::purge_touching(conn, path)
    }
}
