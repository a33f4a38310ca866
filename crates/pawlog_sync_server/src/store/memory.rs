//! In-memory record store.

use super::{ChangeSet, CommitClock, InsertOutcome, RecordStore, ServerRecord};
use crate::error::{ServerError, ServerResult};
use crate::principal::Principal;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pawlog_sync_protocol::{IdempotencyKey, InsertedRecord, OwnerId, RecordId, WireRecord};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct State {
    owners: HashMap<OwnerId, Principal>,
    records: Vec<ServerRecord>,
    by_key: HashMap<(OwnerId, IdempotencyKey), usize>,
    clock: CommitClock,
}

/// Record store held in memory.
///
/// Used by tests and the development server. Supports failing the next
/// write to exercise the endpoint's all-or-nothing path.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: RwLock<State>,
    fail_next_write: AtomicBool,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `insert_new` call fail without writing anything.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Number of stored records, tombstones included.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn owner_principal(&self, owner: &OwnerId) -> ServerResult<Option<Principal>> {
        Ok(self.state.read().owners.get(owner).cloned())
    }

    fn register_owner(&self, owner: &OwnerId, principal: &Principal) -> ServerResult<()> {
        self.state
            .write()
            .owners
            .insert(owner.clone(), principal.clone());
        Ok(())
    }

    fn existing_keys(
        &self,
        owner: &OwnerId,
        keys: &[IdempotencyKey],
    ) -> ServerResult<HashSet<IdempotencyKey>> {
        let state = self.state.read();
        Ok(keys
            .iter()
            .filter(|k| state.by_key.contains_key(&(owner.clone(), (*k).clone())))
            .cloned()
            .collect())
    }

    fn insert_new(
        &self,
        owner: &OwnerId,
        records: &[WireRecord],
        now: DateTime<Utc>,
    ) -> ServerResult<InsertOutcome> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(ServerError::Persistence("injected write failure".into()));
        }

        let mut state = self.state.write();
        let stamp = state.clock.stamp(now);
        let mut outcome = InsertOutcome::default();
        for record in records {
            let key = (owner.clone(), record.idempotency_key.clone());
            if state.by_key.contains_key(&key) {
                outcome.duplicates.push(record.idempotency_key.clone());
                continue;
            }
            let stored = ServerRecord::from_wire(owner, record, stamp);
            outcome.inserted.push(InsertedRecord {
                idempotency_key: stored.idempotency_key.clone(),
                id: stored.id.clone(),
            });
            let index = state.records.len();
            state.records.push(stored);
            state.by_key.insert(key, index);
        }
        Ok(outcome)
    }

    fn changes_since(
        &self,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ServerResult<ChangeSet> {
        let mut state = self.state.write();
        let synced_at = state.clock.stamp(now);
        let mut records: Vec<_> = state
            .records
            .iter()
            .rev()
            .filter(|r| &r.owner_id == owner)
            .filter(|r| since.map_or(true, |s| r.updated_at >= s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(ChangeSet { records, synced_at })
    }

    fn recent_records(
        &self,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> ServerResult<Vec<ServerRecord>> {
        let state = self.state.read();
        let mut records: Vec<_> = state
            .records
            .iter()
            .rev()
            .filter(|r| &r.owner_id == owner && !r.deleted)
            .filter(|r| since.map_or(true, |s| r.timestamp >= s))
            .filter(|r| until.map_or(true, |u| r.timestamp <= u))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    fn soft_delete(
        &self,
        owner: &OwnerId,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> ServerResult<bool> {
        let mut state = self.state.write();
        let state = &mut *state;
        match state
            .records
            .iter_mut()
            .find(|r| &r.owner_id == owner && &r.id == id)
        {
            Some(record) => {
                if !record.deleted {
                    record.deleted = true;
                    record.updated_at = state.clock.stamp(now);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
