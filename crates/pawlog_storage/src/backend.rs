//! Journal backend trait definition.

use crate::error::StorageResult;

/// A durable, append-only byte sink for the local log journal.
///
/// # Invariants
///
/// - `append_durable` returns only after the bytes survive process
///   termination (file backends fsync before returning)
/// - `read_all` returns every byte previously appended, in order
/// - `truncate` only ever shortens the journal; it is used to drop a torn
///   trailing frame during recovery
pub trait JournalBackend: Send + Sync {
    /// Returns the current journal length in bytes.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if nothing has been written yet.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the whole journal.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends `data` and makes it durable.
    ///
    /// Returns the offset the data was written at.
    fn append_durable(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Shortens the journal to `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::InvalidTruncate`] if `len` is greater
    /// than the current length.
    fn truncate(&mut self, len: u64) -> StorageResult<()>;
}
