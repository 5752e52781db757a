//! Document lifecycle engine
//!
//! Implements every mutation over version rows as one transaction followed
//! by one event fan-out:
//!
//! | Operation        | Requires                         | Fails with                     |
//! |------------------|----------------------------------|--------------------------------|
//! | write            | document not deleted             | `DocumentDeleted`              |
//! | delete           | document active                  | `AlreadyDeleted`               |
//! | delete_version   | row exists and is live           | `NotFound`                     |
//! | restore          | document fully deleted           | `NotDeleted`                   |
//! | move_document    | source active, destination empty | `AlreadyExists`                |
//! | copy             | source live, destination empty   | `AlreadyExists`                |
//! | revert           | target row live, doc not deleted | `NotFound` / `DocumentDeleted` |
//!
//! Events are published only after the transaction commits, on the calling
//! thread, before the call returns.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use std::sync::Arc;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::events::{Event, EventBus, Observer};
use crate::models::{DocumentState, Link, Outcome, RevertTarget, Version};
use crate::resolve::resolve_in;
use crate::storage::{links, versions, Database};

/// Runs lifecycle mutations and publishes their events
#[derive(Debug, Clone)]
pub struct LifecycleEngine {
    db: Database,
    bus: EventBus,
}

impl LifecycleEngine {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            bus: EventBus::new(),
        }
    }

    /// Add an observer to receive every committed mutation's event
    pub fn subscribe(&mut self, observer: Arc<dyn Observer>) {
        self.bus.subscribe(observer);
    }

    /// Run `f` in one transaction, then publish the events it produced
    fn commit<T>(
        &self,
        f: impl FnOnce(&Transaction, DateTime<Utc>) -> StoreResult<(T, Vec<Event>)>,
    ) -> StoreResult<T> {
        let (value, events) = self.db.write(|tx| f(tx, Utc::now()))?;
        for event in &events {
            self.bus.publish(event);
        }
        Ok(value)
    }

    /// Append a new version to the document named by `identifier`
    ///
    /// A key writes to that key's document; anything else is a path, which
    /// starts a new lineage at version 1 if it has no rows.
    pub fn write(
        &self,
        identifier: &str,
        content: &str,
        author: &str,
        message: Option<&str>,
    ) -> StoreResult<Outcome> {
        let author = require_author(author)?;
        require_path(identifier)?;

        self.commit(|tx, now| {
            let path = target_path(tx, identifier)?;
            let state = versions::state(tx, &path)?;
            if state.is_deleted() {
                return Err(StoreError::DocumentDeleted { path });
            }

            let row = versions::insert_version(
                tx,
                &path,
                content,
                author,
                message.unwrap_or_default(),
                now,
            )?;
            debug!("Wrote {} v{} ({})", row.path, row.version, row.key);

            let event = Event::Written {
                path: row.path.clone(),
                version: row.version,
                key: row.key.clone(),
                author: author.to_string(),
            };
            Ok((
                Outcome::for_row(&row).with_previous_version(state.head()),
                vec![event],
            ))
        })
    }

    /// Delete by identifier
    ///
    /// A path tombstones every version of the document. A key tombstones
    /// only the version it names.
    pub fn delete(&self, identifier: &str, author: &str) -> StoreResult<Outcome> {
        let author = require_author(author)?;

        self.commit(|tx, now| {
            let resolved = resolve_in(tx, identifier, true)?;
            if resolved.by_key {
                return tombstone_version(tx, &resolved.row.path, resolved.row.version, author, now);
            }

            let (outcome, event) = tombstone_document(tx, resolved.path(), author, now)?;
            Ok((outcome, vec![event]))
        })
    }

    /// Tombstone exactly one version of a document
    pub fn delete_version(
        &self,
        identifier: &str,
        version: u32,
        author: &str,
    ) -> StoreResult<Outcome> {
        let author = require_author(author)?;

        self.commit(|tx, now| {
            let path = resolve_in(tx, identifier, true)?.row.path;
            tombstone_version(tx, &path, version, author, now)
        })
    }

    /// Delete every active document whose path starts with `prefix`
    ///
    /// All documents share one tombstone timestamp and one transaction.
    pub fn delete_recursive(&self, prefix: &str, author: &str) -> StoreResult<Vec<Outcome>> {
        let author = require_author(author)?;
        require_path(prefix)?;

        self.commit(|tx, now| {
            let paths = versions::active_paths_under(tx, prefix)?;
            if paths.is_empty() {
                return Err(StoreError::not_found(format!("{}*", prefix)));
            }

            let mut outcomes = Vec::with_capacity(paths.len());
            let mut events = Vec::with_capacity(paths.len());
            for path in &paths {
                let (outcome, event) = tombstone_document(tx, path, author, now)?;
                outcomes.push(outcome);
                events.push(event);
            }
            Ok((outcomes, events))
        })
    }

    /// Bring back a fully deleted document
    pub fn restore(&self, identifier: &str, author: &str) -> StoreResult<Outcome> {
        let author = require_author(author)?;

        self.commit(|tx, _now| {
            let path = resolve_in(tx, identifier, true)?.row.path;
            match versions::state(tx, &path)? {
                DocumentState::Deleted { .. } => {}
                DocumentState::Active { .. } => return Err(StoreError::NotDeleted { path }),
                DocumentState::Nonexistent => return Err(StoreError::not_found(path)),
            }

            let restored = versions::untombstone_all(tx, &path)?;
            debug!("Restored {} ({} version(s)) by {}", path, restored, author);

            let latest = head_row(tx, &path)?;
            let event = Event::Restored {
                path: path.clone(),
                author: author.to_string(),
            };
            Ok((Outcome::for_row(&latest), vec![event]))
        })
    }

    /// Rename a document, carrying every version with it
    pub fn move_document(&self, from: &str, to: &str, author: &str) -> StoreResult<Outcome> {
        let author = require_author(author)?;
        require_path(to)?;

        self.commit(|tx, _now| {
            let from_path = resolve_in(tx, from, true)?.row.path;
            match versions::state(tx, &from_path)? {
                DocumentState::Active { .. } => {}
                DocumentState::Deleted { .. } => {
                    return Err(StoreError::DocumentDeleted { path: from_path })
                }
                DocumentState::Nonexistent => return Err(StoreError::not_found(from_path)),
            }
            if versions::path_exists(tx, to)? {
                return Err(StoreError::AlreadyExists {
                    path: to.to_string(),
                });
            }

            let moved = versions::rename(tx, &from_path, to)?;
            debug!("Moved {} -> {} ({} version(s))", from_path, to, moved);

            let latest = head_row(tx, to)?;
            let event = Event::Moved {
                from: from_path.clone(),
                to: to.to_string(),
                author: author.to_string(),
            };
            Ok((
                Outcome::for_row(&latest).with_previous_path(from_path),
                vec![event],
            ))
        })
    }

    /// Start a new lineage at `to` from the content `from` resolves to
    pub fn copy(&self, from: &str, to: &str, copier: &str) -> StoreResult<Outcome> {
        let copier = require_author(copier)?;
        require_path(to)?;

        self.commit(|tx, now| {
            let source = resolve_in(tx, from, false)?.row;
            if versions::path_exists(tx, to)? {
                return Err(StoreError::AlreadyExists {
                    path: to.to_string(),
                });
            }

            let message = format!("Copied from {}", from);
            let row = versions::insert_version(tx, to, &source.content, copier, &message, now)?;
            debug!("Copied {} v{} -> {}", source.path, source.version, to);

            let event = Event::Copied {
                from: source.path.clone(),
                to: row.path.clone(),
                key: row.key.clone(),
                author: copier.to_string(),
            };
            Ok((
                Outcome::for_row(&row).with_previous_path(source.path),
                vec![event],
            ))
        })
    }

    /// Append a new version whose content equals an older one
    ///
    /// The target is looked up first; the document's state is then checked
    /// again inside the write transaction, so a delete that lands between
    /// the two is never overridden.
    pub fn revert(
        &self,
        identifier: &str,
        target: &RevertTarget,
        author: &str,
        message: Option<&str>,
    ) -> StoreResult<Outcome> {
        let author = require_author(author)?;

        let source = self
            .db
            .read(|conn| revert_source(conn, identifier, target))?;
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| target.default_message());

        self.apply_revert(&source, author, &message)
    }

    /// Write `source`'s content as the next version of its document, unless
    /// the document stopped being active after `source` was looked up
    pub(crate) fn apply_revert(
        &self,
        source: &Version,
        author: &str,
        message: &str,
    ) -> StoreResult<Outcome> {
        self.commit(|tx, now| {
            let path = source.path.as_str();
            let state = versions::state(tx, path)?;
            match state {
                DocumentState::Active { .. } => {}
                DocumentState::Deleted { .. } => {
                    return Err(StoreError::DocumentDeleted {
                        path: path.to_string(),
                    })
                }
                DocumentState::Nonexistent => return Err(StoreError::not_found(path)),
            }

            let row = versions::insert_version(tx, path, &source.content, author, message, now)?;
            debug!("Reverted {} to v{} as v{}", path, source.version, row.version);

            let event = Event::Reverted {
                path: row.path.clone(),
                version: row.version,
                source_version: source.version,
                author: author.to_string(),
            };
            Ok((
                Outcome::for_row(&row).with_previous_version(Some(source.version)),
                vec![event],
            ))
        })
    }

    /// Create a link between two active documents
    pub fn link(&self, from: &str, to: &str, tag: Option<&str>) -> StoreResult<Link> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());

        self.commit(|tx, now| {
            let from_path = active_endpoint(tx, from)?;
            let to_path = active_endpoint(tx, to)?;

            let link = links::insert_link(tx, &from_path, &to_path, tag, now)?;
            debug!("Linked {} -> {} ({})", from_path, to_path, link.id);

            let event = Event::LinkCreated {
                id: link.id.clone(),
                from: from_path,
                to: to_path,
            };
            Ok((link, vec![event]))
        })
    }

    /// Soft-delete active links from `from` to `to`; any tag when `tag` is `None`
    ///
    /// Returns the number of links removed.
    pub fn unlink(&self, from: &str, to: &str, tag: Option<&str>) -> StoreResult<usize> {
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());

        self.commit(|tx, now| {
            let from_path = link_endpoint(tx, from)?;
            let to_path = link_endpoint(tx, to)?;

            let ids = links::soft_delete_between(tx, &from_path, &to_path, tag, now)?;
            if ids.is_empty() {
                return Err(StoreError::not_found(format!("{} -> {}", from_path, to_path)));
            }

            let events = ids
                .iter()
                .map(|id| Event::LinkRemoved {
                    id: id.clone(),
                    from: from_path.clone(),
                    to: to_path.clone(),
                })
                .collect();
            Ok((ids.len(), events))
        })
    }
}

// ==================== Validation ====================

fn require_author(author: &str) -> StoreResult<&str> {
    let author = author.trim();
    if author.is_empty() {
        return Err(StoreError::invalid_input("author must not be empty"));
    }
    Ok(author)
}

fn require_path(path: &str) -> StoreResult<()> {
    if path.trim().is_empty() {
        return Err(StoreError::invalid_input("path must not be empty"));
    }
    if path.trim() != path {
        return Err(StoreError::invalid_input(format!(
            "path '{}' has leading or trailing whitespace",
            path
        )));
    }
    Ok(())
}

// ==================== Transaction helpers ====================

/// Path an identifier writes to: the keyed document, an existing path, or a
/// new path
fn target_path(conn: &Connection, identifier: &str) -> StoreResult<String> {
    match resolve_in(conn, identifier, true) {
        Ok(resolved) => Ok(resolved.row.path),
        Err(StoreError::NotFound { .. }) => Ok(identifier.to_string()),
        Err(e) => Err(e),
    }
}

/// Path a link operation refers to; links can outlive their documents, so
/// an unresolvable identifier is taken literally
fn link_endpoint(conn: &Connection, identifier: &str) -> StoreResult<String> {
    target_path(conn, identifier)
}

/// Path of an active document a new link may attach to
///
/// The head row may be tombstoned while older rows are live, so resolution
/// includes deleted rows and the document state decides.
fn active_endpoint(conn: &Connection, identifier: &str) -> StoreResult<String> {
    let path = resolve_in(conn, identifier, true)?.row.path;
    if !versions::state(conn, &path)?.is_active() {
        return Err(StoreError::not_found(path));
    }
    Ok(path)
}

fn head_row(conn: &Connection, path: &str) -> StoreResult<Version> {
    versions::latest(conn, path, true)?.ok_or_else(|| StoreError::not_found(path))
}

fn tombstone_document(
    conn: &Connection,
    path: &str,
    author: &str,
    now: DateTime<Utc>,
) -> StoreResult<(Outcome, Event)> {
    match versions::state(conn, path)? {
        DocumentState::Active { .. } => {}
        DocumentState::Deleted { .. } => {
            return Err(StoreError::AlreadyDeleted {
                path: path.to_string(),
            })
        }
        DocumentState::Nonexistent => return Err(StoreError::not_found(path)),
    }

    let tombstoned = versions::tombstone_all(conn, path, now)?;
    debug!("Deleted {} ({} version(s)) by {}", path, tombstoned, author);

    let latest = head_row(conn, path)?;
    let event = Event::Deleted {
        path: path.to_string(),
        version: 0,
        fully_deleted: true,
        author: author.to_string(),
    };
    Ok((Outcome::for_row(&latest), event))
}

fn tombstone_version(
    conn: &Connection,
    path: &str,
    version: u32,
    author: &str,
    now: DateTime<Utc>,
) -> StoreResult<(Outcome, Vec<Event>)> {
    let row = versions::version_of(conn, path, version, false)?
        .ok_or_else(|| StoreError::not_found(format!("{} v{}", path, version)))?;

    versions::tombstone_one(conn, path, version, now)?;
    let fully_deleted = versions::state(conn, path)?.is_deleted();
    debug!(
        "Deleted {} v{} by {}{}",
        path,
        version,
        author,
        if fully_deleted { " (last live version)" } else { "" }
    );

    let event = Event::Deleted {
        path: path.to_string(),
        version,
        fully_deleted,
        author: author.to_string(),
    };
    Ok((Outcome::for_row(&row), vec![event]))
}

/// Find the live row a revert copies from
fn revert_source(
    conn: &Connection,
    identifier: &str,
    target: &RevertTarget,
) -> StoreResult<Version> {
    let path = resolve_in(conn, identifier, true)?.row.path;
    if versions::state(conn, &path)?.is_deleted() {
        return Err(StoreError::DocumentDeleted { path });
    }

    let source = match target {
        RevertTarget::Version(n) => versions::version_of(conn, &path, *n, false)?,
        RevertTarget::Key(key) => versions::by_key(conn, key)?
            .filter(|row| row.path == path && !row.is_deleted()),
    };

    source.ok_or_else(|| match target {
        RevertTarget::Version(n) => StoreError::not_found(format!("{} v{}", path, n)),
        RevertTarget::Key(key) => StoreError::not_found(key.clone()),
    })
}
