//! Error types and result aliases for marcflow.
//!
//! This module defines the shared error types used across all marcflow
//! components. Errors are structured for programmatic handling and include
//! context for debugging.

/// The result type used throughout marcflow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in marcflow core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// An unknown priority value was provided.
    #[error("invalid priority value: {value}")]
    InvalidPriority {
        /// The rejected value.
        value: i32,
    },
}

impl Error {
    /// Creates a new invalid-identifier error.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_display() {
        let err = Error::invalid_id("not a number");
        assert!(err.to_string().contains("invalid identifier"));
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn invalid_priority_display() {
        let err = Error::InvalidPriority { value: 99 };
        assert!(err.to_string().contains("99"));
    }
}
