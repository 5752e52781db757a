//! Storage layer
//!
//! Everything that touches SQLite directly lives here.
//!
//! ## Tables
//!
//! - `versions` - Immutable version rows, keyed by `(path, version)` and by `key`
//! - `lineages` - Highest version number issued per live path
//! - `links` - Relationship edges between document paths

pub mod database;
pub mod links;
pub mod schema;
pub mod versions;

pub use database::Database;
pub use links::LinkStore;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use versions::VersionStore;
