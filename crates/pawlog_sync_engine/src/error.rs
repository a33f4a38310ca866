//! Error types for the sync engine.

use crate::entry::EntryId;
use pawlog_storage::StorageError;
use pawlog_sync_protocol::{IdempotencyKey, SyncDomain};
use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the local log store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The journal backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A journal frame could not be encoded.
    #[error("failed to encode journal frame: {0}")]
    Encode(String),

    /// A journal frame could not be decoded or replayed.
    #[error("corrupt journal frame #{frame}: {reason}")]
    Corrupt {
        /// Index of the frame in the journal.
        frame: usize,
        /// What went wrong.
        reason: String,
    },

    /// An entry with this id already exists.
    #[error("entry {0} already exists")]
    DuplicateEntry(EntryId),

    /// An entry with this idempotency key already exists for the owner.
    #[error("idempotency key {0} is already in use")]
    DuplicateKey(IdempotencyKey),

    /// No entry with this id exists.
    #[error("entry {0} not found")]
    NotFound(EntryId),
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The call did not finish within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The server failed (5xx).
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The server refused access to the owner.
    #[error("ownership rejected: {0}")]
    Ownership(String),

    /// The request or response did not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local store failed.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// The domain has no server endpoint yet.
    #[error("sync for {0} is a pending feature: no server endpoint exists")]
    PendingFeature(SyncDomain),
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
            SyncError::ServerError { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::ServerError {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!SyncError::Ownership("forbidden".into()).is_retryable());
        assert!(!SyncError::Protocol("bad json".into()).is_retryable());
        assert!(!SyncError::PendingFeature(SyncDomain::Reminders).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::PendingFeature(SyncDomain::CarePlans);
        assert!(err.to_string().contains("care_plans"));

        let err = StoreError::Corrupt {
            frame: 3,
            reason: "bad cbor".into(),
        };
        assert_eq!(err.to_string(), "corrupt journal frame #3: bad cbor");
    }
}
