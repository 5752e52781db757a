//! Docstore Core Library
//!
//! This crate provides the core of docstore, a versioned document store
//! where every write appends an immutable version row and deletion is a
//! reversible tombstone until a retention vacuum removes it for good.
//!
//! # Architecture
//!
//! - **SQLite**: one transactional store holds version rows, lineages and
//!   the link graph, so a single backup captures a consistent cut
//! - **LifecycleEngine**: every mutation is one transaction followed by a
//!   synchronous event fan-out to observers
//! - **RetentionVacuum**: the only path that physically deletes rows
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open()?;
//!
//! // Write two versions
//! store.write("docs/readme", "draft", "alice", None)?;
//! let outcome = store.write("docs/readme", "final", "alice", Some("edit"))?;
//!
//! // Read by path or by key
//! let latest = store.show("docs/readme", None)?;
//! let same = store.show(&outcome.key, None)?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage interface (main entry point)
//! - `lifecycle`: Mutations and event publication
//! - `resolve`: Path-or-key identifier resolution
//! - `events`: Event types, observers and the event bus
//! - `integrity`: Link cleanup driven by deletions and vacuum
//! - `vacuum`: Retention vacuum
//! - `storage`: SQLite schema, version rows and links
//! - `models`: Data structures for versions, links and outcomes
//! - `keys`: Version key generation
//! - `config`: Application configuration
//! - `error`: Error taxonomy

pub mod config;
pub mod error;
pub mod events;
pub mod integrity;
pub mod keys;
pub mod lifecycle;
pub mod models;
pub mod resolve;
pub mod storage;
pub mod store;
pub mod vacuum;

pub use config::Config;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use events::{Event, EventBus, Observer};
pub use integrity::LinkIntegrityObserver;
pub use lifecycle::LifecycleEngine;
pub use models::{
    DocumentState, Link, LinkDirection, Outcome, RevertTarget, Version, VersionRange,
};
pub use resolve::{Resolved, Resolver};
pub use storage::{Database, LinkStore, VersionStore};
pub use store::Store;
pub use vacuum::{RetentionVacuum, VacuumHook, VacuumOptions, VacuumReport};
