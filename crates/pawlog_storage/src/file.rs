//! File-backed journal.

use crate::backend::JournalBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in a single file.
///
/// Every append is followed by `sync_data`, so a frame that was reported
/// written is on disk. A crash mid-append leaves at most one partial frame
/// at the tail, which the frame scanner detects and recovery truncates.
///
/// The file is held under an exclusive advisory lock for the lifetime of
/// the backend, so one journal has one writer.
///
/// # Example
///
/// ```no_run
/// use pawlog_storage::{FileBackend, JournalBackend};
/// use std::path::Path;
///
/// let mut journal = FileBackend::open(Path::new("pawlog.journal")).unwrap();
/// journal.append_durable(b"frame bytes").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    len: u64,
}

impl FileBackend {
    /// Opens or creates the journal file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created, or
    /// [`StorageError::Locked`] if another handle already holds it.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // Non-blocking; released when the file is closed.
        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, len }),
        })
    }

    /// Opens the journal, creating parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JournalBackend for FileBackend {
    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let mut buffer = Vec::with_capacity(usize::try_from(state.len).unwrap_or(0));
        state.file.seek(SeekFrom::Start(0))?;
        state.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append_durable(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.inner.lock();
        let offset = state.len;
        if data.is_empty() {
            return Ok(offset);
        }

        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.file.sync_data()?;
        state.len += data.len() as u64;

        Ok(offset)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if len > state.len {
            return Err(StorageError::InvalidTruncate {
                len: state.len,
                requested: len,
            });
        }

        state.file.set_len(len)?;
        state.file.sync_all()?;
        state.len = len;
        Ok(())
    }
}
