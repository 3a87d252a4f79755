//! Error types for the Notable core library.

use thiserror::Error;

/// All errors that can occur within the Notable core library.
#[derive(Debug, Error)]
pub enum NotableError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A referenced note, tag, version or asset does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A slug or name is already taken within its scope.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request would break a structural rule (cycle, missing content, bad input).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A user-scoped tag was paired with a note belonging to someone else.
    #[error("Scope mismatch: {0}")]
    ScopeMismatch(String),

    /// The opened file is not a valid Notable workspace.
    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON (metadata, documents, journal payloads) could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`NotableError`].
pub type Result<T> = std::result::Result<T, NotableError>;

/// Coarse classification of a [`NotableError`], for callers that map errors
/// onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidOperation,
    ScopeMismatch,
    Storage,
}

impl NotableError {
    pub(crate) fn note_not_found(note_id: &str) -> Self {
        Self::NotFound(format!("note {note_id}"))
    }

    pub(crate) fn tag_not_found(tag_id: &str) -> Self {
        Self::NotFound(format!("tag {tag_id}"))
    }

    /// Returns the domain category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::ScopeMismatch(_) => ErrorKind::ScopeMismatch,
            Self::Database(_) | Self::InvalidWorkspace(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::NotFound(what) => format!("{what} no longer exists"),
            Self::Conflict(msg) => msg.clone(),
            Self::InvalidOperation(msg) => msg.clone(),
            Self::ScopeMismatch(_) => "Tag belongs to a different user".to_string(),
            Self::InvalidWorkspace(_) => "Could not open workspace file".to_string(),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classifies_domain_errors() {
        assert_eq!(NotableError::note_not_found("n1").kind(), ErrorKind::NotFound);
        assert_eq!(NotableError::Conflict("slug".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            NotableError::InvalidOperation("cycle".into()).kind(),
            ErrorKind::InvalidOperation
        );
        assert_eq!(NotableError::ScopeMismatch("t".into()).kind(), ErrorKind::ScopeMismatch);
        assert_eq!(
            NotableError::InvalidWorkspace("x".into()).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_not_found_message_names_entity() {
        let e = NotableError::tag_not_found("abc");
        assert_eq!(e.to_string(), "Not found: tag abc");
        assert_eq!(e.user_message(), "tag abc no longer exists");
    }
}
