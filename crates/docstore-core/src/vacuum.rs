//! Retention vacuum
//!
//! Permanently removes tombstoned version rows. This is the only operation
//! that physically deletes data, and it runs only when a caller asks for it.
//! The age filter is the only safety lever here; confirmation belongs to the
//! calling layer.
//!
//! Each candidate path is swept in its own transaction that re-applies the
//! tombstone and age filter, so a document restored after selection keeps
//! its rows. When a sweep removes the last row of a path, every registered
//! [`VacuumHook`] runs inside the same transaction to drop derived rows that
//! referenced it. A path is therefore either fully swept, dependents
//! included, or untouched. Cancellation is checked between paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::storage::{versions, Database};

/// Cleanup owned by a component that derives rows from documents
pub trait VacuumHook: Send + Sync {
    /// Name used as the key in [`VacuumReport::dependents`]
    fn name(&self) -> &str;

    /// Remove derived rows referencing `path`, whose last version row was
    /// just purged. Runs inside the purge transaction; returns rows removed.
    fn on_purged(&self, conn: &Connection, path: &str) -> StoreResult<usize>;
}

/// What to vacuum
#[derive(Debug, Clone, Default)]
pub struct VacuumOptions {
    /// Only rows tombstoned at least this long ago; `None` means every
    /// tombstoned row
    pub older_than: Option<Duration>,
    /// Only paths starting with this literal prefix
    pub prefix: String,
    /// Report what would be removed without committing
    pub dry_run: bool,
}

impl VacuumOptions {
    pub fn older_than(mut self, age: Duration) -> Self {
        self.older_than = Some(age);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Latest tombstone time that qualifies, or `None` for no age limit
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.older_than.map(|age| {
            chrono::Duration::from_std(age)
                .ok()
                .and_then(|age| now.checked_sub_signed(age))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }
}

/// Outcome of a vacuum run
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct VacuumReport {
    /// Version rows removed (or that would be, on a dry run)
    pub deleted_count: usize,
    /// Paths that lost at least one row
    pub affected_paths: Vec<String>,
    /// Rows removed by each hook, keyed by hook name
    pub dependents: BTreeMap<String, usize>,
    pub dry_run: bool,
    /// Whether the run stopped early on request
    pub cancelled: bool,
}

impl VacuumReport {
    /// Version rows plus every hook's rows
    pub fn total_removed(&self) -> usize {
        self.deleted_count + self.dependents.values().sum::<usize>()
    }
}

struct PathSweep {
    removed: usize,
    dependents: Vec<(String, usize)>,
}

/// Permanently purges tombstoned rows past a retention window
#[derive(Clone)]
pub struct RetentionVacuum {
    db: Database,
    hooks: Vec<Arc<dyn VacuumHook>>,
}

impl std::fmt::Debug for RetentionVacuum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("RetentionVacuum")
            .field("hooks", &names)
            .finish()
    }
}

impl RetentionVacuum {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            hooks: Vec::new(),
        }
    }

    /// Register a dependent component's cleanup
    pub fn register(&mut self, hook: Arc<dyn VacuumHook>) {
        self.hooks.push(hook);
    }

    /// Run to completion
    pub fn run(&self, options: &VacuumOptions) -> StoreResult<VacuumReport> {
        self.run_cancellable(options, &AtomicBool::new(false))
    }

    /// Run, stopping between paths once `cancel` is set
    pub fn run_cancellable(
        &self,
        options: &VacuumOptions,
        cancel: &AtomicBool,
    ) -> StoreResult<VacuumReport> {
        let cutoff = options.cutoff(Utc::now());
        let candidates = self
            .db
            .read(|conn| versions::purge_candidates(conn, &options.prefix, cutoff))?;

        let mut report = VacuumReport {
            dry_run: options.dry_run,
            dependents: self
                .hooks
                .iter()
                .map(|h| (h.name().to_string(), 0))
                .collect(),
            ..VacuumReport::default()
        };

        for path in candidates {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            let sweep = |tx: &Transaction| self.sweep_path(tx, &path, cutoff);
            let swept = if options.dry_run {
                self.db.rehearse(sweep)?
            } else {
                self.db.write(sweep)?
            };

            if swept.removed == 0 {
                continue;
            }
            debug!("Vacuumed {} row(s) of '{}'", swept.removed, path);

            report.deleted_count += swept.removed;
            report.affected_paths.push(path);
            for (name, count) in swept.dependents {
                *report.dependents.entry(name).or_insert(0) += count;
            }
        }

        info!(
            "Vacuum {}: {} version row(s) across {} path(s), {} dependent row(s){}",
            if report.dry_run { "dry run" } else { "complete" },
            report.deleted_count,
            report.affected_paths.len(),
            report.total_removed() - report.deleted_count,
            if report.cancelled { ", cancelled" } else { "" }
        );

        Ok(report)
    }

    fn sweep_path(
        &self,
        tx: &Transaction,
        path: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> StoreResult<PathSweep> {
        let purge = versions::purge_path(tx, path, cutoff)?;

        let mut dependents = Vec::new();
        if purge.fully_purged {
            for hook in &self.hooks {
                let removed = hook.on_purged(tx, path)?;
                dependents.push((hook.name().to_string(), removed));
            }
        }

        Ok(PathSweep {
            removed: purge.removed,
            dependents,
        })
    }
}
