//! Error types for the dependency-tracking domain.

use std::time::Duration;

use crate::tracking_key::TrackingKey;

/// The result type used throughout marcflow-track.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dependency-tracking operations.
///
/// Lost-entry races (an entry removed between read and write) are *not*
/// errors: every mutation against an absent key is a logged no-op, because
/// under concurrent completion someone may already have finished the chunk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A per-entry lock could not be acquired within its timeout.
    #[error("lock on {key} not acquired within {timeout:?}")]
    LockTimeout {
        /// The contended tracking key.
        key: TrackingKey,
        /// The configured acquisition timeout.
        timeout: Duration,
    },

    /// An invalid state transition was attempted.
    #[error("invalid scheduling transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current status.
        from: String,
        /// The attempted target status.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// Capacity was queried for a status with no configured bound.
    #[error("status {status} has no capacity bound")]
    NoCapacityBound {
        /// The unbounded status.
        status: String,
    },

    /// A storage operation failed.
    #[error("store error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error from marcflow-core.
    #[error("core error: {0}")]
    Core(#[from] marcflow_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marcflow_core::{ChunkId, JobId};
    use std::error::Error as StdError;

    #[test]
    fn lock_timeout_display() {
        let err = Error::LockTimeout {
            key: TrackingKey::new(JobId::new(1), ChunkId::new(2)),
            timeout: Duration::from_secs(120),
        };
        assert!(err.to_string().contains("1/2"));
    }

    #[test]
    fn transition_error_display() {
        let err = Error::InvalidStateTransition {
            from: "BLOCKED".into(),
            to: "DELIVERING".into(),
            reason: "blocked chunks queue for processing first".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("BLOCKED"));
        assert!(msg.contains("DELIVERING"));
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer gone");
        let err = Error::storage_with_source("cluster write failed", source);
        assert!(err.to_string().contains("store error"));
        assert!(StdError::source(&err).is_some());
    }
}
