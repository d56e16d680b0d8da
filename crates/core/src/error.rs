//! Error types for the ratchet coordination layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Retryability is part of the contract, not a guess: every variant maps to
//! an [`ErrorClass`] via [`Error::class`], and the retry executor consults
//! that classification instead of matching on variants itself. Contention
//! outcomes (lock timeout, version conflict) are retryable; business
//! rejections and storage outages are fatal at this layer.

use thiserror::Error;

/// Result type alias for coordination operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification consumed by the retry executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient contention; safe to retry after backoff
    Retryable,
    /// Retrying cannot fix this; propagate immediately
    Fatal,
}

/// Error types for the coordination layer
#[derive(Debug, Error)]
pub enum Error {
    /// Could not acquire the entity lease within the wait budget
    ///
    /// Indicates contention, not a bug. Normal retryable outcome.
    #[error("lock timeout on {lock_key} after {waited_ms}ms")]
    LockTimeout {
        /// The contended lock key
        lock_key: String,
        /// How long the acquire loop polled before giving up
        waited_ms: u64,
    },

    /// Conditional write rejected: the stored version moved underneath us
    ///
    /// A genuine concurrent write happened between read and write.
    /// The caller must re-read and recompute.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the writer presented
        expected: u64,
        /// Version actually stored at write time
        actual: u64,
    },

    /// The caller's transition function rejected the transition or failed
    ///
    /// Business-logic errors are never retried by this layer.
    #[error("transition rejected: {0}")]
    Transition(String),

    /// Entity not found in durable storage
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Durable storage or coordination store unreachable
    ///
    /// Fatal at this layer; the caller owns circuit-breaking policy.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid operation or state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Retry budget exhausted; wraps the last retryable error
    ///
    /// Terminal. The executor never silently falls back to success.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts performed before giving up
        attempts: u32,
        /// The final retryable error observed
        #[source]
        last_error: Box<Error>,
    },
}

impl Error {
    /// Classify this error for the retry executor
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::LockTimeout { .. } | Error::VersionConflict { .. } => ErrorClass::Retryable,
            Error::Transition(_)
            | Error::EntityNotFound(_)
            | Error::StorageUnavailable(_)
            | Error::Serialization(_)
            | Error::InvalidOperation(_)
            | Error::RetriesExhausted { .. } => ErrorClass::Fatal,
        }
    }

    /// True if the retry executor may try again after backoff
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_lock_timeout() {
        let err = Error::LockTimeout {
            lock_key: "ticket:42".to_string(),
            waited_ms: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("lock timeout"));
        assert!(msg.contains("ticket:42"));
        assert!(msg.contains("2000"));
    }

    #[test]
    fn test_error_display_version_conflict() {
        let err = Error::VersionConflict {
            expected: 7,
            actual: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("version conflict"));
        assert!(msg.contains("7"));
        assert!(msg.contains("9"));
    }

    #[test]
    fn test_error_display_retries_exhausted_includes_cause() {
        let err = Error::RetriesExhausted {
            attempts: 5,
            last_error: Box::new(Error::VersionConflict {
                expected: 3,
                actual: 4,
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("version conflict"));
    }

    #[test]
    fn test_contention_errors_are_retryable() {
        let timeout = Error::LockTimeout {
            lock_key: "job:1".to_string(),
            waited_ms: 100,
        };
        let conflict = Error::VersionConflict {
            expected: 1,
            actual: 2,
        };
        assert!(timeout.is_retryable());
        assert!(conflict.is_retryable());
    }

    #[test]
    fn test_business_and_storage_errors_are_fatal() {
        assert_eq!(
            Error::Transition("escalation threshold not met".to_string()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            Error::StorageUnavailable("connection refused".to_string()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            Error::EntityNotFound("ticket:999".to_string()).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_exhaustion_is_terminal_not_retryable() {
        let err = Error::RetriesExhausted {
            attempts: 3,
            last_error: Box::new(Error::LockTimeout {
                lock_key: "ticket:1".to_string(),
                waited_ms: 50,
            }),
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: std::result::Result<u64, serde_json::Error> =
            serde_json::from_str("not json");
        let err: Error = result.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
