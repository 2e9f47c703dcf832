//! Error types for backend operations.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a key-value backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred on the backend connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key holds a value of a different type than the operation expects.
    #[error("operation against a key holding the wrong kind of value: {key}")]
    WrongType {
        /// The offending key.
        key: String,
    },

    /// An increment was attempted on a value that is not an integer.
    #[error("value at {key} is not an integer or out of range")]
    NotAnInteger {
        /// The offending key.
        key: String,
    },

    /// The backend answered with an error reply.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend sent something that does not follow the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend connection is closed.
    #[error("backend connection is closed")]
    Closed,
}

impl StorageError {
    /// Creates a wrong type error.
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::wrong_type("clay:User:id:1");
        assert_eq!(
            err.to_string(),
            "operation against a key holding the wrong kind of value: clay:User:id:1"
        );

        let err = StorageError::Backend("ERR unknown command".into());
        assert!(err.to_string().contains("unknown command"));
    }
}
