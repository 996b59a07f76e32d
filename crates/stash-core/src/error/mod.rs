//! Error types and result aliases for stash operations.
//!
//! Every failure a caller can observe maps onto one of four kinds:
//! validation, transient backend failure, interruption, or a closed store.
//! Errors are `Clone` so that the single outcome of a coalesced transfer can
//! be handed to every waiter; I/O sources are shared behind an `Arc`.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Unified error type for all stash operations
#[derive(Error, Debug, Clone)]
pub enum StashError {
    // Validation errors
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Invalid digest '{input}': {reason}")]
    InvalidDigest { input: String, reason: String },

    #[error("Invalid action key '{key}': {reason}")]
    InvalidActionKey { key: String, reason: String },

    // Backend errors
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    #[error("Operation interrupted: {message}")]
    Interrupted { message: String },

    #[error("Store is closed")]
    Closed,

    // Config errors
    #[error("Failed to parse {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Local IO errors (source files, sinks)
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Arc<io::Error>,
    },
}

/// Result type alias for stash operations
pub type StashResult<T> = Result<T, StashError>;

/// Coarse classification of a [`StashError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-supplied data or identifiers are wrong; never retried.
    Validation,
    /// Backend or local I/O failed; safe to retry with backoff.
    TransientBackend,
    /// The operation was cut short before it produced an outcome.
    Interrupted,
    /// The store was closed before or during the call.
    Closed,
    /// Configuration could not be loaded or validated.
    Config,
}

impl StashError {
    /// Create a backend error wrapping an I/O failure
    pub fn backend(message: impl Into<String>, source: io::Error) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a backend error without an underlying I/O source
    pub fn backend_msg(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Create an interruption error
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StashError::DigestMismatch { .. }
            | StashError::InvalidDigest { .. }
            | StashError::InvalidActionKey { .. } => ErrorKind::Validation,
            StashError::Backend { .. } | StashError::Io { .. } => ErrorKind::TransientBackend,
            StashError::Interrupted { .. } => ErrorKind::Interrupted,
            StashError::Closed => ErrorKind::Closed,
            StashError::ConfigParse { .. } | StashError::ConfigValidation { .. } => {
                ErrorKind::Config
            }
        }
    }

    /// Check if this error is a validation failure
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if the caller may retry this operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientBackend | ErrorKind::Interrupted
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            StashError::DigestMismatch { .. } => {
                Some("Recompute the digest from the content being uploaded")
            }
            StashError::InvalidDigest { .. } => {
                Some("Digests are written as <hex-hash>/<size-in-bytes>")
            }
            StashError::InvalidActionKey { .. } => {
                Some("Action keys may only contain ASCII letters, digits, '-', '_' and '.'")
            }
            StashError::Backend { .. } => Some("Check the cache backend is reachable and retry"),
            StashError::Closed => Some("Open a new store instance"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let mismatch = StashError::DigestMismatch {
            expected: "aa/1".to_string(),
            actual: "bb/1".to_string(),
        };
        assert_eq!(mismatch.kind(), ErrorKind::Validation);
        assert!(mismatch.is_validation());
        assert!(!mismatch.is_retryable());

        let backend = StashError::backend("disk went away", io::Error::other("boom"));
        assert_eq!(backend.kind(), ErrorKind::TransientBackend);
        assert!(backend.is_retryable());

        assert_eq!(StashError::Closed.kind(), ErrorKind::Closed);
        assert!(!StashError::Closed.is_retryable());

        assert_eq!(StashError::interrupted("gone").kind(), ErrorKind::Interrupted);
    }

    #[test]
    fn test_clone_keeps_source() {
        use std::error::Error;

        let err = StashError::io("failed to write sink", io::Error::other("pipe closed"));
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
        assert_eq!(cloned.source().unwrap().to_string(), "pipe closed");
    }

    #[test]
    fn test_suggestions() {
        assert!(StashError::Closed.suggestion().is_some());
        let config = StashError::ConfigValidation {
            field: "backend".to_string(),
            reason: "unknown".to_string(),
        };
        assert!(config.suggestion().is_none());
    }
}
