//! Authoritative record persistence.
//!
//! Records are scoped by owner and unique per `(owner, idempotency key)`.
//! They are never physically deleted here: deletion sets a tombstone flag
//! and bumps `updated_at` so that incremental pulls observe it.
//!
//! Every store stamps writes and checkpoints from a `CommitClock` held
//! inside its write lock. A write that commits after a pull is therefore
//! stamped at or after the `synced_at` that pull returned.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::error::ServerResult;
use crate::principal::Principal;
use chrono::{DateTime, Utc};
use pawlog_sync_protocol::{
    Category, IdempotencyKey, InsertedRecord, LogFields, OwnerId, RecordId, ServerChange,
    WireRecord,
};
use std::collections::HashSet;

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    /// Server id.
    pub id: RecordId,
    /// Owning entity.
    pub owner_id: OwnerId,
    /// Key the record was uploaded with.
    pub idempotency_key: IdempotencyKey,
    /// Entry category.
    pub category: Category,
    /// Category-specific fields.
    pub fields: LogFields,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// First ingest time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Tombstone flag.
    pub deleted: bool,
}

impl ServerRecord {
    /// Builds a fresh record from an uploaded item.
    pub fn from_wire(owner_id: &OwnerId, record: &WireRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            owner_id: owner_id.clone(),
            idempotency_key: record.idempotency_key.clone(),
            category: record.category,
            fields: record.fields.clone(),
            timestamp: record.timestamp,
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }

    /// Converts to the wire form returned to clients.
    pub fn to_change(&self) -> ServerChange {
        ServerChange {
            id: self.id.clone(),
            idempotency_key: self.idempotency_key.clone(),
            category: self.category,
            timestamp: self.timestamp,
            updated_at: self.updated_at,
            deleted: self.deleted,
            fields: self.fields.clone(),
        }
    }
}

/// Result of an incremental pull.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    /// Records with `updated_at >= since`, newest update first.
    pub records: Vec<ServerRecord>,
    /// Checkpoint for the next pull. No later write is stamped before it.
    pub synced_at: DateTime<Utc>,
}

/// Issues commit timestamps that never run backwards.
///
/// Must only be used while holding the store's write lock.
#[derive(Debug, Default)]
pub(crate) struct CommitClock {
    high_water: Option<DateTime<Utc>>,
}

impl CommitClock {
    pub(crate) fn starting_at(high_water: Option<DateTime<Utc>>) -> Self {
        Self { high_water }
    }

    /// Returns `now`, raised to the latest stamp already issued.
    pub(crate) fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let stamp = self.high_water.map_or(now, |last| last.max(now));
        self.high_water = Some(stamp);
        stamp
    }
}

/// Result of an insert-if-absent batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows written by this call.
    pub inserted: Vec<InsertedRecord>,
    /// Keys that hit the uniqueness constraint.
    pub duplicates: Vec<IdempotencyKey>,
}

/// Storage primitives used by the sync endpoint.
///
/// Implementations must be safe to call from many request threads. The
/// endpoint relies on two guarantees: the `(owner, idempotency key)`
/// uniqueness constraint, and stamps issued by one `CommitClock` under
/// the lock that serializes writes.
pub trait RecordStore: Send + Sync {
    /// Returns the principal an owner belongs to, if the owner is known.
    fn owner_principal(&self, owner: &OwnerId) -> ServerResult<Option<Principal>>;

    /// Registers (or re-assigns) an owner to a principal.
    fn register_owner(&self, owner: &OwnerId, principal: &Principal) -> ServerResult<()>;

    /// Returns which of `keys` already exist for the owner.
    fn existing_keys(
        &self,
        owner: &OwnerId,
        keys: &[IdempotencyKey],
    ) -> ServerResult<HashSet<IdempotencyKey>>;

    /// Inserts every record whose key is absent, in one all-or-nothing write.
    ///
    /// A key that already exists when the write runs is reported in
    /// `duplicates` instead of failing the batch. On error nothing is
    /// written. Rows are stamped with the commit time, which is `now`
    /// unless an earlier stamp or checkpoint was issued after it.
    fn insert_new(
        &self,
        owner: &OwnerId,
        records: &[WireRecord],
        now: DateTime<Utc>,
    ) -> ServerResult<InsertOutcome>;

    /// Returns all records with `updated_at >= since`, newest update first,
    /// tombstones included. `None` returns everything.
    ///
    /// The query and the returned checkpoint are taken atomically with
    /// respect to writes.
    fn changes_since(
        &self,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ServerResult<ChangeSet>;

    /// Returns live records with event timestamps in `[since, until]`,
    /// newest event first, at most `limit` of them.
    fn recent_records(
        &self,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> ServerResult<Vec<ServerRecord>>;

    /// Marks a record deleted. Returns `false` if no such record exists.
    ///
    /// Deleting an already-deleted record succeeds without bumping
    /// `updated_at` again. The tombstone is stamped like an insert.
    fn soft_delete(&self, owner: &OwnerId, id: &RecordId, now: DateTime<Utc>)
        -> ServerResult<bool>;
}
