//! Unified storage interface
//!
//! The `Store` owns the database handle and wires every component to it:
//! - `VersionStore` and `Resolver` for reads
//! - `LifecycleEngine` for mutations, with `LinkIntegrityObserver` subscribed
//! - `LinkStore` for the link graph
//! - `RetentionVacuum`, with the link store registered as a hook
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open()?;
//!
//! let outcome = store.write("docs/readme", "hello", "alice", None)?;
//! let row = store.show(&outcome.key, None)?;
//!
//! store.delete("docs/readme", "alice")?;
//! store.vacuum(&VacuumOptions::default().older_than(thirty_days))?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::events::Observer;
use crate::integrity::LinkIntegrityObserver;
use crate::lifecycle::LifecycleEngine;
use crate::models::{
    DocumentState, Link, LinkDirection, Outcome, RevertTarget, Version, VersionRange,
};
use crate::resolve::{Resolved, Resolver};
use crate::storage::{Database, LinkStore, VersionStore};
use crate::vacuum::{RetentionVacuum, VacuumHook, VacuumOptions, VacuumReport};

/// Versioned document store
pub struct Store {
    db: Database,
    versions: VersionStore,
    resolver: Resolver,
    links: Arc<LinkStore>,
    engine: LifecycleEngine,
    vacuum: RetentionVacuum,
    config: Config,
}

impl Store {
    /// Open the store described by the user's configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let db = Database::open(&config.sqlite_path()).with_context(|| {
            format!(
                "Failed to open database at {}",
                config.sqlite_path().display()
            )
        })?;
        Ok(Self::with_database(db, config))
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db, Config::default()))
    }

    fn with_database(db: Database, config: Config) -> Self {
        let links = Arc::new(LinkStore::new(db.clone()));

        let mut engine = LifecycleEngine::new(db.clone());
        engine.subscribe(Arc::new(LinkIntegrityObserver::new(db.clone())));

        let mut vacuum = RetentionVacuum::new(db.clone());
        vacuum.register(links.clone());

        Self {
            versions: VersionStore::new(db.clone()),
            resolver: Resolver::new(db.clone()),
            links,
            engine,
            vacuum,
            config,
            db,
        }
    }

    /// Release the database connection
    ///
    /// Any component handles still alive keep the connection open until
    /// they are dropped.
    pub fn close(self) -> StoreResult<()> {
        let Self {
            db,
            versions,
            resolver,
            links,
            engine,
            vacuum,
            ..
        } = self;
        drop((versions, resolver, links, engine, vacuum));
        db.close()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add an observer after the built-in ones
    pub fn subscribe(&mut self, observer: Arc<dyn Observer>) {
        self.engine.subscribe(observer);
    }

    /// Add a vacuum hook after the built-in ones
    pub fn register_vacuum_hook(&mut self, hook: Arc<dyn VacuumHook>) {
        self.vacuum.register(hook);
    }

    // ==================== Mutations ====================

    pub fn write(
        &self,
        identifier: &str,
        content: &str,
        author: &str,
        message: Option<&str>,
    ) -> StoreResult<Outcome> {
        self.engine.write(identifier, content, author, message)
    }

    pub fn delete(&self, identifier: &str, author: &str) -> StoreResult<Outcome> {
        self.engine.delete(identifier, author)
    }

    pub fn delete_version(
        &self,
        identifier: &str,
        version: u32,
        author: &str,
    ) -> StoreResult<Outcome> {
        self.engine.delete_version(identifier, version, author)
    }

    pub fn delete_recursive(&self, prefix: &str, author: &str) -> StoreResult<Vec<Outcome>> {
        self.engine.delete_recursive(prefix, author)
    }

    pub fn restore(&self, identifier: &str, author: &str) -> StoreResult<Outcome> {
        self.engine.restore(identifier, author)
    }

    pub fn move_document(&self, from: &str, to: &str, author: &str) -> StoreResult<Outcome> {
        self.engine.move_document(from, to, author)
    }

    pub fn copy(&self, from: &str, to: &str, copier: &str) -> StoreResult<Outcome> {
        self.engine.copy(from, to, copier)
    }

    pub fn revert(
        &self,
        identifier: &str,
        target: &RevertTarget,
        author: &str,
        message: Option<&str>,
    ) -> StoreResult<Outcome> {
        self.engine.revert(identifier, target, author, message)
    }

    pub fn link(&self, from: &str, to: &str, tag: Option<&str>) -> StoreResult<Link> {
        self.engine.link(from, to, tag)
    }

    pub fn unlink(&self, from: &str, to: &str, tag: Option<&str>) -> StoreResult<usize> {
        self.engine.unlink(from, to, tag)
    }

    // ==================== Reads ====================

    /// Resolve an identifier to a row
    pub fn resolve(&self, identifier: &str, include_deleted: bool) -> StoreResult<Resolved> {
        self.resolver.resolve(identifier, include_deleted)
    }

    /// The live row an identifier names, or a specific version of its document
    pub fn show(&self, identifier: &str, version: Option<u32>) -> StoreResult<Version> {
        match version {
            None => Ok(self.resolver.resolve(identifier, false)?.row),
            Some(n) => {
                let path = self.canonical_path(identifier)?;
                self.versions.version(&path, n, false)
            }
        }
    }

    /// Latest row of a path; tombstoned heads only with `include_deleted`
    pub fn latest(&self, path: &str, include_deleted: bool) -> StoreResult<Version> {
        self.versions.latest(path, include_deleted)
    }

    /// Every row of the identifier's document, ascending
    pub fn history(&self, identifier: &str, include_deleted: bool) -> StoreResult<Vec<Version>> {
        let path = self.canonical_path(identifier)?;
        self.versions.history(&path, include_deleted)
    }

    /// Live rows whose version falls within `range`
    pub fn history_range(&self, identifier: &str, range: VersionRange) -> StoreResult<Vec<Version>> {
        Ok(self
            .history(identifier, false)?
            .into_iter()
            .filter(|row| range.contains(row.version))
            .collect())
    }

    /// Two versions of one document, for comparison
    pub fn version_pair(
        &self,
        identifier: &str,
        a: u32,
        b: u32,
    ) -> StoreResult<(Version, Version)> {
        if a == 0 || b == 0 {
            return Err(StoreError::invalid_range("version numbers start at 1"));
        }
        if a == b {
            return Err(StoreError::invalid_range(format!(
                "cannot compare v{} with itself",
                a
            )));
        }
        let path = self.canonical_path(identifier)?;
        Ok((
            self.versions.version(&path, a, true)?,
            self.versions.version(&path, b, true)?,
        ))
    }

    /// Latest row of every document under `prefix`
    pub fn list(&self, prefix: &str, include_deleted: bool) -> StoreResult<Vec<Version>> {
        self.versions.list(prefix, include_deleted)
    }

    /// Lifecycle state; an unknown identifier is `Nonexistent`
    pub fn state(&self, identifier: &str) -> StoreResult<DocumentState> {
        match self.resolver.resolve(identifier, true) {
            Ok(resolved) => self.versions.state(resolved.path()),
            Err(StoreError::NotFound { .. }) => Ok(DocumentState::Nonexistent),
            Err(e) => Err(e),
        }
    }

    /// Links touching a document
    ///
    /// Links can outlive their documents, so an identifier that no longer
    /// resolves is used as a literal path.
    pub fn links(
        &self,
        identifier: &str,
        direction: LinkDirection,
        include_deleted: bool,
    ) -> StoreResult<Vec<Link>> {
        let path = match self.resolver.resolve(identifier, true) {
            Ok(resolved) => resolved.row.path,
            Err(StoreError::NotFound { .. }) => identifier.to_string(),
            Err(e) => return Err(e),
        };
        self.links.links(&path, direction, include_deleted)
    }

    /// Paths with no active link in either direction
    pub fn orphans(&self) -> StoreResult<Vec<String>> {
        self.links.orphans()
    }

    // ==================== Vacuum ====================

    /// Permanently remove tombstoned rows
    pub fn vacuum(&self, options: &VacuumOptions) -> StoreResult<VacuumReport> {
        self.vacuum.run(options)
    }

    /// Permanently remove tombstoned rows, stopping early once `cancel` is set
    pub fn vacuum_cancellable(
        &self,
        options: &VacuumOptions,
        cancel: &AtomicBool,
    ) -> StoreResult<VacuumReport> {
        self.vacuum.run_cancellable(options, cancel)
    }

    fn canonical_path(&self, identifier: &str) -> StoreResult<String> {
        Ok(self.resolver.resolve(identifier, true)?.row.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn test_config(temp_dir: &TempDir) -> Config {
        Config::with_data_dir(temp_dir.path())
    }

    struct Exploding {
        calls: Arc<AtomicUsize>,
    }

    impl Observer for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn on_event(&self, _event: &Event) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("observer failure")
        }
    }

    #[test]
    fn test_scenario_delete_hides_latest() {
        let store = store();
        store.write("docs/a", "v1", "alice", Some("")).unwrap();
        store.write("docs/a", "v2", "alice", Some("")).unwrap();
        store.delete("docs/a", "alice").unwrap();

        assert!(matches!(
            store.latest("docs/a", false),
            Err(StoreError::NotFound { .. })
        ));
        let latest = store.latest("docs/a", true).unwrap();
        assert_eq!(latest.version, 2);
        assert!(latest.deleted_at.is_some());
    }

    #[test]
    fn test_scenario_revert_to_first_version() {
        let store = store();
        for content in ["v1", "v2", "v3"] {
            store.write("docs/a", content, "alice", None).unwrap();
        }

        store
            .revert("docs/a", &RevertTarget::Version(1), "alice", None)
            .unwrap();

        let history = store.history("docs/a", false).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].content, "v1");
        assert_eq!(history[3].message, "Revert to v1");
        assert_eq!(store.show("docs/a", None).unwrap().content, "v1");
    }

    #[test]
    fn test_scenario_delete_strips_links() {
        let store = store();
        store.write("a", "x", "alice", None).unwrap();
        store.write("b", "y", "alice", None).unwrap();
        store.link("a", "b", Some("")).unwrap();

        store.delete("a", "alice").unwrap();

        assert!(store
            .links("b", LinkDirection::Both, false)
            .unwrap()
            .is_empty());
        let orphans = store.orphans().unwrap();
        assert!(orphans.contains(&"a".to_string()));
        assert!(orphans.contains(&"b".to_string()));
    }

    #[test]
    fn test_scenario_vacuum_then_fresh_lineage() {
        let store = store();
        store.write("a", "old", "alice", None).unwrap();
        store.write("a", "older", "alice", None).unwrap();
        store.delete("a", "alice").unwrap();

        let report = store.vacuum(&VacuumOptions::default()).unwrap();
        assert_eq!(report.deleted_count, 2);
        assert!(store.history("a", true).is_err());
        assert_eq!(store.state("a").unwrap(), DocumentState::Nonexistent);

        let outcome = store.write("a", "fresh", "alice", None).unwrap();
        assert_eq!(outcome.version, 1);
    }

    #[test]
    fn test_versions_survive_deletes_and_restores() {
        let store = store();
        let mut written = Vec::new();
        for i in 1..=6 {
            let content = format!("content {}", i);
            store.write("docs/p", &content, "alice", None).unwrap();
            written.push(content);
            if i % 2 == 0 {
                store.delete("docs/p", "alice").unwrap();
                store.restore("docs/p", "alice").unwrap();
            }
        }

        let history = store.history("docs/p", false).unwrap();
        let numbers: Vec<u32> = history.iter().map(|r| r.version).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        for (i, content) in written.iter().enumerate() {
            assert_eq!(
                &store.show("docs/p", Some(i as u32 + 1)).unwrap().content,
                content
            );
        }
    }

    #[test]
    fn test_revert_leaves_intermediate_versions_untouched() {
        let store = store();
        for content in ["a", "b", "c", "d"] {
            store.write("docs/p", content, "alice", None).unwrap();
        }
        let before = store.history("docs/p", true).unwrap();

        let outcome = store
            .revert("docs/p", &RevertTarget::Version(2), "bob", None)
            .unwrap();
        assert_eq!(outcome.version, 5);

        let after = store.history("docs/p", true).unwrap();
        assert_eq!(&after[..4], &before[..]);
        assert_eq!(after[4].content, "b");
    }

    #[test]
    fn test_revert_of_deleted_document_fails() {
        // A key from a document deleted before the call is still not a valid target
        let store = store();
        store.write("docs/p", "one", "alice", None).unwrap();
        store.write("docs/p", "two", "alice", None).unwrap();
        let target = store.show("docs/p", Some(1)).unwrap();

        store.delete("docs/p", "bob").unwrap();

        assert!(matches!(
            store.revert("docs/p", &RevertTarget::Key(target.key), "alice", None),
            Err(StoreError::DocumentDeleted { .. })
        ));
        assert_eq!(store.history("docs/p", true).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_writers_get_gapless_versions() {
        let store = store();

        std::thread::scope(|scope| {
            for writer in ["alice", "bob"] {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..25 {
                        let content = format!("{} {}", writer, i);
                        store.write("docs/shared", &content, writer, None).unwrap();
                    }
                });
            }
        });

        let history = store.history("docs/shared", false).unwrap();
        let versions: Vec<u32> = history.iter().map(|v| v.version).collect();
        assert_eq!(versions, (1..=50).collect::<Vec<u32>>());

        let keys: std::collections::HashSet<&str> =
            history.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(keys.len(), 50);
        assert_eq!(history.iter().filter(|v| v.author == "bob").count(), 25);
    }

    #[test]
    fn test_move_then_history_matches() {
        let store = store();
        store.write("docs/p", "one", "alice", Some("first")).unwrap();
        store.write("docs/p", "two", "bob", Some("second")).unwrap();
        let before = store.history("docs/p", true).unwrap();

        store.move_document("docs/p", "docs/q", "carol").unwrap();

        let after = store.history("docs/q", true).unwrap();
        let strip = |rows: &[Version]| {
            rows.iter()
                .map(|r| (r.version, r.key.clone(), r.content.clone(), r.author.clone(), r.message.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&before[..]), strip(&after[..]));
        assert!(matches!(
            store.history("docs/p", true),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_links_follow_paths_not_moves() {
        let store = store();
        store.write("a", "x", "alice", None).unwrap();
        store.write("b", "y", "alice", None).unwrap();
        store.link("a", "b", None).unwrap();

        // Links reference paths; a moved endpoint leaves the old path linked
        store.move_document("b", "c", "alice").unwrap();
        let links = store.links("a", LinkDirection::Outgoing, false).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to_path, "b");
    }

    #[test]
    fn test_delete_only_touches_links_of_that_path() {
        let store = store();
        for path in ["a", "b", "c", "d"] {
            store.write(path, "x", "alice", None).unwrap();
        }
        store.link("a", "b", None).unwrap();
        store.link("c", "a", Some("cites")).unwrap();
        store.link("c", "d", None).unwrap();

        store.delete("a", "alice").unwrap();

        let remaining = store.links("c", LinkDirection::Both, false).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].to_path, "d");
        let tombstoned = store.links("a", LinkDirection::Both, true).unwrap();
        assert_eq!(tombstoned.len(), 2);
        assert!(tombstoned.iter().all(|l| !l.is_active()));
    }

    #[test]
    fn test_partial_delete_keeps_links() {
        let store = store();
        store.write("a", "1", "alice", None).unwrap();
        store.write("a", "2", "alice", None).unwrap();
        store.write("b", "x", "alice", None).unwrap();
        store.link("a", "b", None).unwrap();

        store.delete_version("a", 2, "alice").unwrap();
        assert_eq!(store.links("a", LinkDirection::Both, false).unwrap().len(), 1);

        store.delete_version("a", 1, "alice").unwrap();
        assert!(store.links("a", LinkDirection::Both, false).unwrap().is_empty());
    }

    #[test]
    fn test_vacuum_purges_dead_links_with_document() {
        let store = store();
        store.write("a", "x", "alice", None).unwrap();
        store.write("b", "y", "alice", None).unwrap();
        store.link("a", "b", None).unwrap();
        store.delete("a", "alice").unwrap();

        let report = store.vacuum(&VacuumOptions::default()).unwrap();
        assert_eq!(report.dependents.get("links"), Some(&1));
        assert!(store.links("b", LinkDirection::Both, true).unwrap().is_empty());
    }

    #[test]
    fn test_vacuum_age_window() {
        let store = store();
        store.write("a", "x", "alice", None).unwrap();
        store.delete("a", "alice").unwrap();

        let options = VacuumOptions::default().older_than(Duration::from_secs(3600));
        for _ in 0..2 {
            let report = store.vacuum(&options).unwrap();
            assert_eq!(report.deleted_count, 0);
        }
        assert_eq!(store.history("a", true).unwrap().len(), 1);

        // Restored before it aged out: nothing left to vacuum
        store.restore("a", "alice").unwrap();
        assert_eq!(store.vacuum(&VacuumOptions::default()).unwrap().deleted_count, 0);
    }

    #[test]
    fn test_vacuum_cancellation() {
        let store = store();
        store.write("a", "x", "alice", None).unwrap();
        store.delete("a", "alice").unwrap();

        let cancel = AtomicBool::new(true);
        let report = store
            .vacuum_cancellable(&VacuumOptions::default(), &cancel)
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(store.history("a", true).unwrap().len(), 1);
    }

    #[test]
    fn test_observer_failure_does_not_fail_mutation() {
        let mut store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        store.subscribe(Arc::new(Exploding {
            calls: calls.clone(),
        }));

        let outcome = store.write("docs/a", "x", "alice", None).unwrap();
        assert_eq!(outcome.version, 1);
        store.delete("docs/a", "alice").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.state("docs/a").unwrap().is_deleted());
    }

    #[test]
    fn test_show_by_key_and_version() {
        let store = store();
        let first = store.write("docs/a", "one", "alice", None).unwrap();
        store.write("docs/a", "two", "alice", None).unwrap();

        assert_eq!(store.show(&first.key, None).unwrap().content, "one");
        assert_eq!(store.show("docs/a", None).unwrap().content, "two");
        assert_eq!(store.show(&first.key, Some(2)).unwrap().content, "two");
        assert!(matches!(
            store.show("docs/a", Some(3)),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_history_range_and_version_pair() {
        let store = store();
        for content in ["1", "2", "3", "4"] {
            store.write("docs/a", content, "alice", None).unwrap();
        }

        let range = VersionRange::parse("2..3").unwrap();
        let rows = store.history_range("docs/a", range).unwrap();
        let numbers: Vec<u32> = rows.iter().map(|r| r.version).collect();
        assert_eq!(numbers, vec![2, 3]);

        let (a, b) = store.version_pair("docs/a", 1, 4).unwrap();
        assert_eq!((a.content.as_str(), b.content.as_str()), ("1", "4"));
        assert!(matches!(
            store.version_pair("docs/a", 2, 2),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.version_pair("docs/a", 0, 2),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.version_pair("docs/a", 1, 9),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_state_of_unknown_identifier() {
        let store = store();
        assert_eq!(store.state("nope").unwrap(), DocumentState::Nonexistent);
        store.write("docs/a", "x", "alice", None).unwrap();
        assert_eq!(
            store.state("docs/a").unwrap(),
            DocumentState::Active { head: 1 }
        );
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let key = {
            let store = Store::open_with_config(test_config(&temp_dir)).unwrap();
            let outcome = store.write("docs/a", "persisted", "alice", None).unwrap();
            store.close().unwrap();
            outcome.key
        };

        let store = Store::open_with_config(test_config(&temp_dir)).unwrap();
        let row = store.show(&key, None).unwrap();
        assert_eq!(row.path, "docs/a");
        assert_eq!(row.content, "persisted");
        assert_eq!(store.config().data_dir, temp_dir.path());
    }
}
