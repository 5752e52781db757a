//! Data models for docstore
//!
//! Defines the core data structures: version rows, links, document state and
//! the outcome record every mutation returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::keys::KEY_LENGTH;

/// One immutable record of a document's content at a point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    /// Hierarchical document path (rewritten by move)
    pub path: String,
    /// Version number, starting at 1 per lineage
    pub version: u32,
    /// Globally unique opaque key
    pub key: String,
    /// Document content
    pub content: String,
    /// Who wrote this version
    pub author: String,
    /// Commit message (may be empty)
    pub message: String,
    /// When this version was written
    pub created_at: DateTime<Utc>,
    /// Tombstone timestamp, set while the row is soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Version {
    /// Whether this row is tombstoned
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A labelled relationship edge between two document paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    /// Opaque identifier
    pub id: String,
    pub from_path: String,
    pub to_path: String,
    /// Optional label
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Link {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The endpoint opposite to `path`, if `path` is one of the endpoints
    pub fn other_end(&self, path: &str) -> Option<&str> {
        if self.from_path == path {
            Some(&self.to_path)
        } else if self.to_path == path {
            Some(&self.from_path)
        } else {
            None
        }
    }
}

/// Which links to return for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkDirection {
    /// Links whose `from_path` is the path
    Outgoing,
    /// Links whose `to_path` is the path
    Incoming,
    /// Either endpoint
    #[default]
    Both,
}

/// Lifecycle state of a document path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentState {
    /// No rows exist for the path
    Nonexistent,
    /// At least one row is not tombstoned
    Active { head: u32 },
    /// Every row is tombstoned
    Deleted { head: u32 },
}

impl DocumentState {
    pub fn is_active(&self) -> bool {
        matches!(self, DocumentState::Active { .. })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, DocumentState::Deleted { .. })
    }

    pub fn exists(&self) -> bool {
        !matches!(self, DocumentState::Nonexistent)
    }

    /// Highest version number present, if any
    pub fn head(&self) -> Option<u32> {
        match self {
            DocumentState::Nonexistent => None,
            DocumentState::Active { head } | DocumentState::Deleted { head } => Some(*head),
        }
    }
}

/// Result of a mutating operation
///
/// Carries the canonical path, the version(s) involved and the row key.
/// Formatting is left to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    /// Canonical path after the operation
    pub path: String,
    /// Key of the row the operation produced or acted on
    pub key: String,
    /// Version number produced or acted on
    pub version: u32,
    /// Version the operation started from (previous head, revert source)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<u32>,
    /// Path before a move, or the source of a copy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

impl Outcome {
    pub(crate) fn for_row(row: &Version) -> Self {
        Self {
            path: row.path.clone(),
            key: row.key.clone(),
            version: row.version,
            previous_version: None,
            previous_path: None,
        }
    }

    pub(crate) fn with_previous_version(mut self, version: Option<u32>) -> Self {
        self.previous_version = version;
        self
    }

    pub(crate) fn with_previous_path(mut self, path: impl Into<String>) -> Self {
        self.previous_path = Some(path.into());
        self
    }
}

/// Inclusive range of version numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub from: u32,
    pub to: u32,
}

impl VersionRange {
    /// Create a range, rejecting zero and reversed bounds
    pub fn new(from: u32, to: u32) -> StoreResult<Self> {
        if from == 0 || to == 0 {
            return Err(StoreError::invalid_range(format!(
                "versions start at 1 (got {}..{})",
                from, to
            )));
        }
        if from > to {
            return Err(StoreError::invalid_range(format!(
                "start {} is after end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Parse `FROM..TO`, or a single `N` meaning `N..N`
    pub fn parse(input: &str) -> StoreResult<Self> {
        let input = input.trim();
        let (from, to) = match input.split_once("..") {
            Some((from, to)) => (from.trim(), to.trim()),
            None => (input, input),
        };

        let parse = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| StoreError::invalid_range(format!("'{}' is not a version number", s)))
        };

        Self::new(parse(from)?, parse(to)?)
    }

    pub fn contains(&self, version: u32) -> bool {
        (self.from..=self.to).contains(&version)
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// Which version a revert should copy content from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertTarget {
    /// A version number of the target document
    Version(u32),
    /// The key of one of the target document's rows
    Key(String),
}

impl RevertTarget {
    /// Interpret caller input: key-length strings are keys, numbers
    /// (optionally prefixed with `v`) are version numbers, anything else is
    /// treated as a key
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.len() == KEY_LENGTH {
            return RevertTarget::Key(trimmed.to_string());
        }
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        match digits.parse::<u32>() {
            Ok(n) => RevertTarget::Version(n),
            _ => RevertTarget::Key(trimmed.to_string()),
        }
    }

    /// Default commit message for a revert to this target
    pub fn default_message(&self) -> String {
        match self {
            RevertTarget::Version(n) => format!("Revert to v{}", n),
            RevertTarget::Key(key) => format!("Revert to {}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_link() -> Link {
        Link {
            id: "abcd1234".to_string(),
            from_path: "docs/a".to_string(),
            to_path: "docs/b".to_string(),
            tag: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_link_other_end() {
        let link = sample_link();
        assert_eq!(link.other_end("docs/a"), Some("docs/b"));
        assert_eq!(link.other_end("docs/b"), Some("docs/a"));
        assert_eq!(link.other_end("docs/c"), None);
        assert!(link.is_active());
    }

    #[test]
    fn test_document_state_helpers() {
        assert!(!DocumentState::Nonexistent.exists());
        assert_eq!(DocumentState::Nonexistent.head(), None);

        let active = DocumentState::Active { head: 3 };
        assert!(active.is_active());
        assert_eq!(active.head(), Some(3));

        let deleted = DocumentState::Deleted { head: 2 };
        assert!(deleted.is_deleted());
        assert!(deleted.exists());
    }

    #[test]
    fn test_version_range_parse() {
        assert_eq!(VersionRange::parse("2..5").unwrap(), VersionRange { from: 2, to: 5 });
        assert_eq!(VersionRange::parse("3").unwrap(), VersionRange { from: 3, to: 3 });
        assert_eq!(VersionRange::parse(" 1 .. 2 ").unwrap().to_string(), "1..2");
    }

    #[test]
    fn test_version_range_rejects_malformed() {
        for input in ["0..2", "5..2", "a..b", "..", "1..", ""] {
            let err = VersionRange::parse(input).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidRange { .. }),
                "input {:?} gave {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_version_range_contains() {
        let range = VersionRange::new(2, 4).unwrap();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn test_revert_target_parse() {
        assert_eq!(RevertTarget::parse("3"), RevertTarget::Version(3));
        assert_eq!(RevertTarget::parse("v12"), RevertTarget::Version(12));
        assert_eq!(
            RevertTarget::parse("Kx9fQ2aB"),
            RevertTarget::Key("Kx9fQ2aB".to_string())
        );
        assert_eq!(RevertTarget::parse("v"), RevertTarget::Key("v".to_string()));
        // Key-length input is a key even when it happens to be all digits
        assert_eq!(
            RevertTarget::parse("12345678"),
            RevertTarget::Key("12345678".to_string())
        );
    }

    #[test]
    fn test_revert_default_message() {
        assert_eq!(RevertTarget::Version(1).default_message(), "Revert to v1");
        assert_eq!(
            RevertTarget::Key("Kx9fQ2aB".to_string()).default_message(),
            "Revert to Kx9fQ2aB"
        );
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let outcome = Outcome {
            path: "docs/a".to_string(),
            key: "abcd1234".to_string(),
            version: 1,
            previous_version: None,
            previous_path: None,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(!json.contains("previous_version"));
        assert!(!json.contains("previous_path"));

        let deserialized: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, deserialized);
    }
}
