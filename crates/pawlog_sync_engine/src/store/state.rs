//! In-memory view of the journal.

use super::StoreMutation;
use crate::entry::{EntryId, LogEntry, SyncState};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use pawlog_sync_protocol::{IdempotencyKey, OwnerId, RecordId};
use std::collections::HashMap;

/// Entries plus the indexes used for lookups.
///
/// Rebuilt on open by replaying every journal frame in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    entries: HashMap<EntryId, LogEntry>,
    by_key: HashMap<(OwnerId, IdempotencyKey), EntryId>,
    by_remote: HashMap<RecordId, EntryId>,
    checkpoints: HashMap<OwnerId, DateTime<Utc>>,
}

impl StoreState {
    pub(crate) fn apply(&mut self, mutation: &StoreMutation) -> StoreResult<()> {
        match mutation {
            StoreMutation::Insert(entry) => {
                if self.entries.contains_key(&entry.id) {
                    return Err(StoreError::DuplicateEntry(entry.id));
                }
                if self.by_key.contains_key(&key_of(entry)) {
                    return Err(StoreError::DuplicateKey(entry.idempotency_key.clone()));
                }
                self.put(entry.clone());
            }
            StoreMutation::MarkSynced {
                id,
                remote_id,
                synced_at,
            } => {
                let entry = self.entries.get_mut(id).ok_or(StoreError::NotFound(*id))?;
                entry.sync_state = SyncState::Synced;
                entry.last_synced_at = Some(*synced_at);
                if entry.remote_id.is_none() {
                    if let Some(remote_id) = remote_id {
                        entry.remote_id = Some(remote_id.clone());
                        self.by_remote.insert(remote_id.clone(), *id);
                    }
                }
            }
            StoreMutation::UpsertFromRemote(entry) => {
                let known_remote = entry
                    .remote_id
                    .as_ref()
                    .is_some_and(|r| self.by_remote.contains_key(r));
                if !known_remote
                    && !self.by_key.contains_key(&key_of(entry))
                    && !self.entries.contains_key(&entry.id)
                {
                    self.put(entry.clone());
                }
            }
            StoreMutation::DeleteByKey { owner_id, key } => {
                if let Some(id) = self.by_key.get(&(owner_id.clone(), key.clone())).copied() {
                    self.remove(id);
                }
            }
            StoreMutation::DeleteByRemoteId(remote_id) => {
                if let Some(id) = self.by_remote.get(remote_id).copied() {
                    self.remove(id);
                }
            }
            StoreMutation::SetCheckpoint { owner_id, at } => {
                self.checkpoints.insert(owner_id.clone(), *at);
            }
        }
        Ok(())
    }

    fn put(&mut self, entry: LogEntry) {
        self.by_key.insert(key_of(&entry), entry.id);
        if let Some(remote_id) = &entry.remote_id {
            self.by_remote.insert(remote_id.clone(), entry.id);
        }
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.remove(&id) {
            self.by_key.remove(&key_of(&entry));
            if let Some(remote_id) = &entry.remote_id {
                self.by_remote.remove(remote_id);
            }
        }
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&LogEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn by_key(&self, owner: &OwnerId, key: &IdempotencyKey) -> Option<&LogEntry> {
        self.by_key
            .get(&(owner.clone(), key.clone()))
            .and_then(|id| self.entries.get(id))
    }

    pub(crate) fn by_remote(&self, remote_id: &RecordId) -> Option<&LogEntry> {
        self.by_remote
            .get(remote_id)
            .and_then(|id| self.entries.get(id))
    }

    pub(crate) fn checkpoint(&self, owner: &OwnerId) -> Option<DateTime<Utc>> {
        self.checkpoints.get(owner).copied()
    }

    /// Entries of one owner matching `filter`, oldest event first.
    pub(crate) fn select(
        &self,
        owner: &OwnerId,
        filter: impl Fn(&LogEntry) -> bool,
    ) -> Vec<LogEntry> {
        let mut selected: Vec<LogEntry> = self
            .entries
            .values()
            .filter(|e| &e.owner_id == owner && filter(e))
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        selected
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn key_of(entry: &LogEntry) -> (OwnerId, IdempotencyKey) {
    (entry.owner_id.clone(), entry.idempotency_key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawlog_sync_protocol::{Category, LogFields};

    fn entry() -> LogEntry {
        LogEntry::new(
            OwnerId::new("pet"),
            Category::Meal,
            Utc::now(),
            LogFields::default(),
        )
    }

    #[test]
    fn insert_rejects_reused_keys() {
        let mut state = StoreState::default();
        let first = entry();
        state.apply(&StoreMutation::Insert(first.clone())).unwrap();

        let mut clash = entry();
        clash.idempotency_key = first.idempotency_key.clone();
        assert!(matches!(
            state.apply(&StoreMutation::Insert(clash)),
            Err(StoreError::DuplicateKey(_))
        ));
    }

    #[test]
    fn mark_synced_never_overwrites_remote_id() {
        let mut state = StoreState::default();
        let e = entry();
        let id = e.id;
        state.apply(&StoreMutation::Insert(e)).unwrap();

        let now = Utc::now();
        state
            .apply(&StoreMutation::MarkSynced {
                id,
                remote_id: Some(RecordId::new("first")),
                synced_at: now,
            })
            .unwrap();
        state
            .apply(&StoreMutation::MarkSynced {
                id,
                remote_id: Some(RecordId::new("second")),
                synced_at: now,
            })
            .unwrap();

        assert_eq!(state.get(id).unwrap().remote_id, Some(RecordId::new("first")));
        assert!(state.by_remote(&RecordId::new("second")).is_none());
    }

    #[test]
    fn deletes_clean_up_indexes() {
        let mut state = StoreState::default();
        let mut e = entry();
        e.remote_id = Some(RecordId::new("r"));
        let key = e.idempotency_key.clone();
        state.apply(&StoreMutation::UpsertFromRemote(e)).unwrap();
        assert_eq!(state.len(), 1);

        state
            .apply(&StoreMutation::DeleteByRemoteId(RecordId::new("r")))
            .unwrap();
        assert_eq!(state.len(), 0);
        assert!(state.by_key(&OwnerId::new("pet"), &key).is_none());
    }
}
