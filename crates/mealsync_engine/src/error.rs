//! Error types for the sync engine.

use mealsync_protocol::{CodecError, EntityKind};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote answered a push with `success: false`.
    #[error("server rejected push: {0}")]
    ServerRejected(String),

    /// Protocol error (malformed message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store failure.
    #[error("store error: {0}")]
    Store(String),

    /// An entity the engine expected to find is missing from the store.
    #[error("{kind} {id} not found in local store")]
    NotFound {
        /// Entity kind.
        kind: EntityKind,
        /// Local id or cloud id that was looked up.
        id: String,
    },

    /// Another sync cycle is already in flight.
    #[error("a sync cycle is already running")]
    AlreadySyncing,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A network call exceeded its timeout.
    #[error("operation timed out")]
    Timeout,

    /// The execution mode does not allow network access.
    #[error("remote access disabled")]
    RemoteDisabled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerRejected(_) => true,
            _ => false,
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection refused").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::ServerRejected("busy".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::AlreadySyncing.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotFound {
            kind: EntityKind::Plan,
            id: "42".into(),
        };
        assert_eq!(err.to_string(), "plan 42 not found in local store");
        assert_eq!(SyncError::Timeout.to_string(), "operation timed out");
    }
}
