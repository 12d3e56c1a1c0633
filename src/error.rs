//! Relay Error Types
//!
//! Errors raised inside the relay core. None of these are allowed to escape
//! the per-connection or per-tick boundary; callers log them and move on.

use thiserror::Error;

/// Errors produced by the connection registry, relay engine and chat store
#[derive(Debug, Error)]
pub enum RelayError {
    /// Writing to a single connection failed; the connection gets evicted
    #[error("transport write to {id} failed: {reason}")]
    TransportWriteFailure { id: String, reason: String },

    /// The chat store could not persist a message; fan-out still proceeds
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Inbound payload was malformed; the connection gets closed
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Registry is full
    #[error("connection limit of {0} reached")]
    CapacityExceeded(usize),

    /// Another live connection already holds this identifier
    #[error("connection {0} is already registered")]
    DuplicateConnection(String),

    /// Registry stopped accepting connections for shutdown
    #[error("server is shutting down")]
    ShuttingDown,
}

impl RelayError {
    /// Build a transport write failure for the given connection
    pub fn write_failure(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportWriteFailure {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error should remove the connection from the registry
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportWriteFailure { .. } | Self::ProtocolViolation(_)
        )
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolViolation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RelayError::write_failure("c1", "closed").is_connection_fatal());
        assert!(RelayError::ProtocolViolation("bad".into()).is_connection_fatal());
        assert!(!RelayError::PersistenceFailure("down".into()).is_connection_fatal());
        assert!(!RelayError::CapacityExceeded(10).is_connection_fatal());
        assert!(!RelayError::ShuttingDown.is_connection_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::write_failure("conn-1", "queue full");
        assert_eq!(err.to_string(), "transport write to conn-1 failed: queue full");
    }
}
