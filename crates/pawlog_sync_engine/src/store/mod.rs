//! Local log store.
//!
//! Durable keyed storage of log entries, their sync state and per-owner
//! checkpoints. Every change goes through [`LogStore::commit`], which
//! applies a batch of [`StoreMutation`]s as one atomic unit: after a crash
//! the store holds either none or all of a commit.

mod journal;
mod state;

pub use journal::JournalLogStore;

use crate::entry::{EntryId, LogEntry};
use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use pawlog_sync_protocol::{IdempotencyKey, OwnerId, RecordId, ServerChange};
use serde::{Deserialize, Serialize};

/// One change to the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreMutation {
    /// Adds a new entry. Fails if the id or the owner's key is taken.
    Insert(LogEntry),
    /// Marks an entry acknowledged.
    ///
    /// `remote_id` is recorded only if the entry has none yet.
    MarkSynced {
        /// Entry to update.
        id: EntryId,
        /// Server id, when known.
        remote_id: Option<RecordId>,
        /// Acknowledgement time.
        synced_at: DateTime<Utc>,
    },
    /// Adds a server-originated entry unless the owner already has an
    /// entry with the same key or remote id.
    UpsertFromRemote(LogEntry),
    /// Removes the owner's entry with this key, if any.
    DeleteByKey {
        /// Owner of the entry.
        owner_id: OwnerId,
        /// Key of the entry.
        key: IdempotencyKey,
    },
    /// Removes the entry with this server id, if any.
    DeleteByRemoteId(RecordId),
    /// Advances the owner's pull checkpoint.
    SetCheckpoint {
        /// Owner.
        owner_id: OwnerId,
        /// New checkpoint.
        at: DateTime<Utc>,
    },
}

/// Durable local storage used by the sync coordinator.
///
/// All operations are synchronous and short; the coordinator calls them
/// only between network awaits.
pub trait LogStore: Send + Sync {
    /// Applies `mutations` atomically and durably.
    fn commit(&self, mutations: Vec<StoreMutation>) -> StoreResult<()>;

    /// Returns the owner's unsynced entries, oldest event first.
    fn fetch_pending(&self, owner: &OwnerId) -> StoreResult<Vec<LogEntry>>;

    /// Returns every entry of the owner, oldest event first.
    fn entries(&self, owner: &OwnerId) -> StoreResult<Vec<LogEntry>>;

    /// Looks up an entry by local id.
    fn fetch_by_id(&self, id: EntryId) -> StoreResult<Option<LogEntry>>;

    /// Looks up the owner's entry with this idempotency key.
    fn find_by_idempotency_key(
        &self,
        owner: &OwnerId,
        key: &IdempotencyKey,
    ) -> StoreResult<Option<LogEntry>>;

    /// Looks up an entry by server id.
    fn find_by_remote_id(&self, remote_id: &RecordId) -> StoreResult<Option<LogEntry>>;

    /// Returns the owner's last successful pull time.
    fn checkpoint(&self, owner: &OwnerId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Number of unsynced entries for the owner.
    fn pending_count(&self, owner: &OwnerId) -> StoreResult<usize> {
        Ok(self.fetch_pending(owner)?.len())
    }

    /// Inserts a new entry.
    fn insert(&self, entry: LogEntry) -> StoreResult<()> {
        self.commit(vec![StoreMutation::Insert(entry)])
    }

    /// Marks an entry synced.
    fn mark_synced(
        &self,
        id: EntryId,
        remote_id: Option<RecordId>,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.commit(vec![StoreMutation::MarkSynced {
            id,
            remote_id,
            synced_at,
        }])
    }

    /// Inserts a server record as a synced entry if absent.
    ///
    /// Returns `false` when an entry with the same key or remote id
    /// already exists.
    fn upsert_from_remote(
        &self,
        owner: &OwnerId,
        change: &ServerChange,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if self
            .find_by_idempotency_key(owner, &change.idempotency_key)?
            .is_some()
            || self.find_by_remote_id(&change.id)?.is_some()
        {
            return Ok(false);
        }
        self.commit(vec![StoreMutation::UpsertFromRemote(LogEntry::from_remote(
            owner.clone(),
            change,
            synced_at,
        ))])?;
        Ok(true)
    }

    /// Removes the entry with this server id. Returns `false` if none.
    fn delete_by_remote_id(&self, remote_id: &RecordId) -> StoreResult<bool> {
        if self.find_by_remote_id(remote_id)?.is_none() {
            return Ok(false);
        }
        self.commit(vec![StoreMutation::DeleteByRemoteId(remote_id.clone())])?;
        Ok(true)
    }

    /// Advances the owner's checkpoint.
    fn set_checkpoint(&self, owner: &OwnerId, at: DateTime<Utc>) -> StoreResult<()> {
        self.commit(vec![StoreMutation::SetCheckpoint {
            owner_id: owner.clone(),
            at,
        }])
    }
}
