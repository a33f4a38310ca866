//! Error types for journal storage.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing a journal.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A complete frame failed validation.
    #[error("journal corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Byte offset of the offending frame.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Another handle holds the journal's exclusive lock.
    #[error("journal is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// The frame payload exceeds the envelope's length field.
    #[error("frame payload too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Truncation target lies beyond the end of the journal.
    #[error("cannot truncate journal of {len} bytes to {requested} bytes")]
    InvalidTruncate {
        /// Current journal length.
        len: u64,
        /// Requested length.
        requested: u64,
    },
}

impl StorageError {
    /// Creates a corruption error for the frame at `offset`.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
