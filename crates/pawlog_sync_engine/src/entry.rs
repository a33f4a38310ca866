//! Local log entries.

use chrono::{DateTime, Utc};
use pawlog_sync_protocol::{
    Category, IdempotencyKey, LogFields, OwnerId, RecordId, ServerChange, WireRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable local identifier of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Generates a new id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether the server has acknowledged an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Created or changed locally, not yet acknowledged.
    Unsynced,
    /// Acknowledged by the server.
    Synced,
}

/// A pet health event recorded on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local id.
    pub id: EntryId,
    /// Owning entity.
    pub owner_id: OwnerId,
    /// Dedup token, fixed at creation.
    pub idempotency_key: IdempotencyKey,
    /// Entry category.
    pub category: Category,
    /// Category-specific fields.
    pub fields: LogFields,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Sync state.
    pub sync_state: SyncState,
    /// Server id, once known.
    pub remote_id: Option<RecordId>,
    /// When the entry was last acknowledged.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    /// Creates a new unsynced entry with a fresh id and idempotency key.
    pub fn new(
        owner_id: OwnerId,
        category: Category,
        timestamp: DateTime<Utc>,
        fields: LogFields,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            owner_id,
            idempotency_key: IdempotencyKey::generate(),
            category,
            fields,
            timestamp,
            sync_state: SyncState::Unsynced,
            remote_id: None,
            last_synced_at: None,
        }
    }

    /// Materializes a server record that has no local counterpart.
    pub fn from_remote(owner_id: OwnerId, change: &ServerChange, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::generate(),
            owner_id,
            idempotency_key: change.idempotency_key.clone(),
            category: change.category,
            fields: change.fields.clone(),
            timestamp: change.timestamp,
            sync_state: SyncState::Synced,
            remote_id: Some(change.id.clone()),
            last_synced_at: Some(synced_at),
        }
    }

    /// Returns true if the entry still needs uploading.
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Unsynced
    }

    /// Converts to the upload form.
    pub fn to_wire(&self) -> WireRecord {
        WireRecord {
            idempotency_key: self.idempotency_key.clone(),
            category: self.category,
            timestamp: self.timestamp,
            fields: self.fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entries_are_pending_with_unique_keys() {
        let owner = OwnerId::new("pet");
        let a = LogEntry::new(owner.clone(), Category::Meal, Utc::now(), LogFields::default());
        let b = LogEntry::new(owner, Category::Meal, Utc::now(), LogFields::default());
        assert!(a.is_pending());
        assert!(a.remote_id.is_none());
        assert_ne!(a.idempotency_key, b.idempotency_key);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn remote_entries_arrive_synced() {
        let change = ServerChange {
            id: RecordId::new("r-1"),
            idempotency_key: IdempotencyKey::new("k-1"),
            category: Category::Weight,
            timestamp: Utc::now(),
            updated_at: Utc::now(),
            deleted: false,
            fields: LogFields::default().with_quantity(4.2, "kg"),
        };
        let entry = LogEntry::from_remote(OwnerId::new("pet"), &change, Utc::now());
        assert!(!entry.is_pending());
        assert_eq!(entry.remote_id, Some(RecordId::new("r-1")));
        assert_eq!(entry.to_wire().idempotency_key, change.idempotency_key);
    }
}
