//! Error handling for store operations
//!
//! Provides typed errors for every lifecycle operation. Each variant maps to a
//! stable [`ErrorKind`] so calling layers can render consistent guidance
//! without matching on message text.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Stable classification of store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Path, key or version absent (or hidden by a deletion filter)
    NotFound,
    /// Destination collision on move, copy or link
    AlreadyExists,
    /// Delete on a document that is already fully deleted
    AlreadyDeleted,
    /// Restore on a document that is not fully deleted
    NotDeleted,
    /// Write or revert against a fully deleted document
    DocumentDeleted,
    /// Malformed version pair or range
    InvalidRange,
    /// Caller-supplied argument rejected before touching storage
    InvalidInput,
    /// Underlying storage failure; the caller may retry
    TransientIo,
}

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Nothing matched the identifier
    #[error("Not found: '{what}'")]
    NotFound { what: String },

    /// Destination already has rows
    #[error("Already exists: '{path}'")]
    AlreadyExists { path: String },

    /// Delete called twice without a restore in between
    #[error("Document '{path}' is already deleted")]
    AlreadyDeleted { path: String },

    /// Restore called on a document that still has live versions
    #[error("Document '{path}' is not deleted. Restore requires a currently-deleted document.")]
    NotDeleted { path: String },

    /// Mutation attempted on a fully deleted document
    #[error("Document '{path}' is deleted. Restore it before writing or reverting.")]
    DocumentDeleted { path: String },

    /// Version range or pair is malformed
    #[error("Invalid range: {details}")]
    InvalidRange { details: String },

    /// Argument rejected before any storage access
    #[error("Invalid input: {details}")]
    InvalidInput { details: String },

    /// Could not find an unused key within the retry budget
    #[error("Could not generate a unique key after {attempts} attempts")]
    KeyExhausted { attempts: usize },

    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection lock poisoned by a panicking thread
    #[error("Database handle is unusable: a previous operation panicked")]
    Poisoned,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound { what: what.into() }
    }

    pub fn invalid_range(details: impl Into<String>) -> Self {
        StoreError::InvalidRange {
            details: details.into(),
        }
    }

    pub fn invalid_input(details: impl Into<String>) -> Self {
        StoreError::InvalidInput {
            details: details.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StoreError::AlreadyDeleted { .. } => ErrorKind::AlreadyDeleted,
            StoreError::NotDeleted { .. } => ErrorKind::NotDeleted,
            StoreError::DocumentDeleted { .. } => ErrorKind::DocumentDeleted,
            StoreError::InvalidRange { .. } => ErrorKind::InvalidRange,
            StoreError::InvalidInput { .. } => ErrorKind::InvalidInput,
            StoreError::KeyExhausted { .. }
            | StoreError::CreateDirectory { .. }
            | StoreError::Database(_)
            | StoreError::Poisoned
            | StoreError::Io(_) => ErrorKind::TransientIo,
        }
    }

    /// Check if the caller may reasonably retry the same operation
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::NotFound => {
                Some("Check the path or key. Deleted documents are hidden unless deleted rows are included.")
            }
            ErrorKind::AlreadyExists => Some("Choose a destination path that has no versions."),
            ErrorKind::AlreadyDeleted => Some("The document is already deleted; use restore to bring it back."),
            ErrorKind::NotDeleted => Some("Restore only applies to a document whose every version is deleted."),
            ErrorKind::DocumentDeleted => Some("Restore the document first, then retry."),
            ErrorKind::InvalidRange => Some("Versions start at 1 and ranges are written as FROM..TO with FROM <= TO."),
            ErrorKind::InvalidInput => None,
            ErrorKind::TransientIo => {
                Some("The storage layer failed (disk full, locked database). Retry once the condition clears.")
            }
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(StoreError::not_found("docs/a").kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::AlreadyDeleted {
                path: "docs/a".to_string()
            }
            .kind(),
            ErrorKind::AlreadyDeleted
        );
        assert_eq!(
            StoreError::invalid_range("0..2").kind(),
            ErrorKind::InvalidRange
        );
        assert_eq!(
            StoreError::KeyExhausted { attempts: 16 }.kind(),
            ErrorKind::TransientIo
        );
    }

    #[test]
    fn test_sqlite_errors_are_transient() {
        let err = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.is_transient());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_state_errors_are_not_transient() {
        let err = StoreError::NotDeleted {
            path: "docs/a".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_not_deleted_display() {
        let err = StoreError::NotDeleted {
            path: "docs/a".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("docs/a"));
        assert!(msg.contains("currently-deleted"));
    }

    #[test]
    fn test_every_caller_facing_kind_has_guidance() {
        let errors = [
            StoreError::not_found("x"),
            StoreError::AlreadyExists {
                path: "x".to_string(),
            },
            StoreError::AlreadyDeleted {
                path: "x".to_string(),
            },
            StoreError::NotDeleted {
                path: "x".to_string(),
            },
            StoreError::DocumentDeleted {
                path: "x".to_string(),
            },
            StoreError::invalid_range("x"),
        ];

        for err in &errors {
            assert!(err.recovery_suggestion().is_some(), "{:?}", err);
        }
    }
}
