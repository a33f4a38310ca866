//! In-memory journal for tests.

use crate::backend::JournalBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory journal.
///
/// Clones share the same buffer, so a test can hand one clone to a log
/// store, drop the store, and reopen a new store over another clone to
/// simulate a process restart.
///
/// # Example
///
/// ```rust
/// use pawlog_storage::{InMemoryBackend, JournalBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let reopened = backend.clone();
/// backend.append_durable(b"frame").unwrap();
/// assert_eq!(reopened.read_all().unwrap(), b"frame");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal holding `data`, e.g. a hand-crafted torn tail.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent append fail with an I/O error.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of the journal bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl JournalBackend for InMemoryBackend {
    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        Ok(self.snapshot())
    }

    fn append_durable(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other(
                "injected append failure",
            )));
        }

        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current = data.len() as u64;
        if len > current {
            return Err(StorageError::InvalidTruncate {
                len: current,
                requested: len,
            });
        }

        data.truncate(len as usize);
        Ok(())
    }
}
