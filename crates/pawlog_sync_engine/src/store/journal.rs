//! Journal-backed log store.

use super::state::StoreState;
use super::{LogStore, StoreMutation};
use crate::entry::{EntryId, LogEntry};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pawlog_storage::{frame, FileBackend, InMemoryBackend, JournalBackend};
use pawlog_sync_protocol::{IdempotencyKey, OwnerId, RecordId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Payload of one journal frame: the mutations of one commit.
#[derive(Debug, Serialize, Deserialize)]
struct CommitRecord {
    mutations: Vec<StoreMutation>,
}

struct Inner<B> {
    backend: B,
    state: StoreState,
}

/// A [`LogStore`] persisted as an append-only journal of commits.
///
/// Each commit is one CBOR-encoded, checksummed frame. Opening the store
/// replays every frame; a torn trailing frame left by a crash is cut off.
pub struct JournalLogStore<B: JournalBackend> {
    inner: RwLock<Inner<B>>,
}

impl JournalLogStore<FileBackend> {
    /// Opens (or creates) a journal file.
    pub fn open_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(FileBackend::open_with_create_dirs(path.as_ref())?)
    }
}

impl JournalLogStore<InMemoryBackend> {
    /// Creates an empty store held in memory.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                backend: InMemoryBackend::new(),
                state: StoreState::default(),
            }),
        }
    }
}

impl<B: JournalBackend> JournalLogStore<B> {
    /// Opens a store over `backend`, replaying its journal.
    pub fn open(mut backend: B) -> StoreResult<Self> {
        let bytes = backend.read_all()?;
        let scan = frame::scan(&bytes)?;

        if scan.torn_tail {
            warn!(
                valid_len = scan.valid_len,
                journal_len = bytes.len(),
                "discarding torn journal tail"
            );
            backend.truncate(scan.valid_len)?;
        }

        let mut state = StoreState::default();
        for (index, payload) in scan.payloads.iter().enumerate() {
            let record: CommitRecord =
                ciborium::de::from_reader(payload.as_slice()).map_err(|e| StoreError::Corrupt {
                    frame: index,
                    reason: e.to_string(),
                })?;
            for mutation in &record.mutations {
                state.apply(mutation).map_err(|e| StoreError::Corrupt {
                    frame: index,
                    reason: e.to_string(),
                })?;
            }
        }
        debug!(
            frames = scan.payloads.len(),
            entries = state.len(),
            "journal replayed"
        );

        Ok(Self {
            inner: RwLock::new(Inner { backend, state }),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.inner.read().state)
    }
}

impl<B: JournalBackend> LogStore for JournalLogStore<B> {
    fn commit(&self, mutations: Vec<StoreMutation>) -> StoreResult<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();

        let mut next = inner.state.clone();
        for mutation in &mutations {
            next.apply(mutation)?;
        }

        let record = CommitRecord { mutations };
        let mut payload = Vec::new();
        ciborium::ser::into_writer(&record, &mut payload)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        let bytes = frame::encode(&payload)?;
        inner.backend.append_durable(&bytes)?;

        inner.state = next;
        Ok(())
    }

    fn fetch_pending(&self, owner: &OwnerId) -> StoreResult<Vec<LogEntry>> {
        Ok(self.read(|s| s.select(owner, LogEntry::is_pending)))
    }

    fn entries(&self, owner: &OwnerId) -> StoreResult<Vec<LogEntry>> {
        Ok(self.read(|s| s.select(owner, |_| true)))
    }

    fn fetch_by_id(&self, id: EntryId) -> StoreResult<Option<LogEntry>> {
        Ok(self.read(|s| s.get(id).cloned()))
    }

    fn find_by_idempotency_key(
        &self,
        owner: &OwnerId,
        key: &IdempotencyKey,
    ) -> StoreResult<Option<LogEntry>> {
        Ok(self.read(|s| s.by_key(owner, key).cloned()))
    }

    fn find_by_remote_id(&self, remote_id: &RecordId) -> StoreResult<Option<LogEntry>> {
        Ok(self.read(|s| s.by_remote(remote_id).cloned()))
    }

    fn checkpoint(&self, owner: &OwnerId) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.read(|s| s.checkpoint(owner)))
    }
}
