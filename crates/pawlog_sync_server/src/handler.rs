//! Request handling for the sync endpoint.
//!
//! The handler is synchronous and stateless between requests: all state
//! lives in the [`RecordStore`]. HTTP routes call it from the blocking pool.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::principal::Principal;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use pawlog_sync_protocol::{
    IdempotencyKey, InboundSyncRequest, OwnerId, RecentRecordsQuery, RecentRecordsResponse,
    RecordId, SyncResponse, WireRecord,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Handler for sync, recent-records and delete requests.
pub struct SyncHandler {
    config: ServerConfig,
    store: Arc<dyn RecordStore>,
    clock: Clock,
}

impl SyncHandler {
    /// Creates a handler over a record store.
    pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Fails unless `owner` is registered to `principal`.
    ///
    /// Unknown owners are indistinguishable from foreign ones.
    pub fn authorize(&self, principal: &Principal, owner: &OwnerId) -> ServerResult<()> {
        match self.store.owner_principal(owner)? {
            Some(p) if &p == principal => Ok(()),
            _ => {
                warn!(owner = %owner, principal = %principal, "ownership check failed");
                Err(ServerError::Forbidden(owner.clone()))
            }
        }
    }

    /// Handles one sync call: upload, dedup, insert, then incremental pull.
    pub fn handle_sync(
        &self,
        principal: &Principal,
        request: InboundSyncRequest,
    ) -> ServerResult<SyncResponse> {
        let owner = &request.owner_id;
        self.authorize(principal, owner)?;

        if request.batch.len() > self.config.max_batch_size {
            return Err(ServerError::BatchTooLarge {
                size: request.batch.len(),
                max: self.config.max_batch_size,
            });
        }

        let now = (self.clock)();
        let (valid, rejected) = request.decode_batch(now);
        for item in &rejected {
            warn!(owner = %owner, index = item.index, reason = %item.reason, "rejected batch item");
        }

        let (unique, repeated) = split_repeats(valid.into_iter().map(|(_, r)| r));
        let keys: Vec<IdempotencyKey> = unique.iter().map(|r| r.idempotency_key.clone()).collect();
        let existing = self.store.existing_keys(owner, &keys)?;

        let (present, fresh): (Vec<WireRecord>, Vec<WireRecord>) = unique
            .into_iter()
            .partition(|r| existing.contains(&r.idempotency_key));

        let outcome = self.store.insert_new(owner, &fresh, now)?;

        let mut duplicates: Vec<IdempotencyKey> =
            present.into_iter().map(|r| r.idempotency_key).collect();
        duplicates.extend(outcome.duplicates);
        duplicates.extend(repeated);

        let changes = self
            .store
            .changes_since(owner, request.checkpoint, (self.clock)())?;

        info!(
            owner = %owner,
            inserted = outcome.inserted.len(),
            duplicates = duplicates.len(),
            rejected = rejected.len(),
            changes = changes.records.len(),
            "sync handled"
        );

        Ok(SyncResponse {
            inserted_count: outcome.inserted.len(),
            inserted: outcome.inserted,
            duplicate_idempotency_keys: duplicates,
            rejected,
            server_changes: changes.records.iter().map(|r| r.to_change()).collect(),
            synced_at: changes.synced_at,
        })
    }

    /// Returns recent live records for an owner, newest event first.
    pub fn recent_records(
        &self,
        principal: &Principal,
        owner: &OwnerId,
        query: &RecentRecordsQuery,
    ) -> ServerResult<RecentRecordsResponse> {
        self.authorize(principal, owner)?;

        if let (Some(since), Some(until)) = (query.since, query.until) {
            if since > until {
                return Err(ServerError::InvalidRequest(
                    "`since` is after `until`".to_string(),
                ));
            }
        }

        let cap = self.config.recent_records_cap;
        let limit = query.limit.map_or(cap, |l| l.min(cap));
        let records = self
            .store
            .recent_records(owner, query.since, query.until, limit)?;
        debug!(owner = %owner, returned = records.len(), limit, "recent records");

        Ok(RecentRecordsResponse {
            owner_id: owner.clone(),
            records: records.iter().map(|r| r.to_change()).collect(),
        })
    }

    /// Soft-deletes a record so that clients remove it on their next pull.
    pub fn delete_record(
        &self,
        principal: &Principal,
        owner: &OwnerId,
        id: &RecordId,
    ) -> ServerResult<()> {
        self.authorize(principal, owner)?;
        if self.store.soft_delete(owner, id, (self.clock)())? {
            info!(owner = %owner, record = %id, "record tombstoned");
            Ok(())
        } else {
            Err(ServerError::NotFound(format!("record {id}")))
        }
    }
}

/// Keeps the first occurrence of every key; later repeats are returned
/// separately.
fn split_repeats(
    records: impl Iterator<Item = WireRecord>,
) -> (Vec<WireRecord>, Vec<IdempotencyKey>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut repeated = Vec::new();
    for record in records {
        if seen.insert(record.idempotency_key.clone()) {
            unique.push(record);
        } else {
            repeated.push(record.idempotency_key);
        }
    }
    (unique, repeated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeSet, InsertOutcome, MemoryRecordStore, ServerRecord};
    use chrono::Duration;
    use parking_lot::Mutex;
    use pawlog_sync_protocol::{Category, LogFields, SyncRequest};
    use serde_json::json;
    use std::sync::mpsc;

    struct Fixture {
        handler: SyncHandler,
        store: Arc<MemoryRecordStore>,
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    fn base() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .register_owner(&OwnerId::new("pet"), &Principal::new("alice"))
            .unwrap();
        let now = Arc::new(Mutex::new(base()));
        let clock_now = Arc::clone(&now);
        let handler = SyncHandler::new(
            ServerConfig::default().with_max_batch_size(10),
            store.clone(),
        )
        .with_clock(Arc::new(move || *clock_now.lock()));
        Fixture {
            handler,
            store,
            now,
        }
    }

    impl Fixture {
        fn advance(&self, minutes: i64) {
            *self.now.lock() += Duration::minutes(minutes);
        }

        fn sync(
            &self,
            checkpoint: Option<DateTime<Utc>>,
            batch: Vec<WireRecord>,
        ) -> ServerResult<SyncResponse> {
            sync_with(&self.handler, checkpoint, batch)
        }
    }

    fn sync_with(
        handler: &SyncHandler,
        checkpoint: Option<DateTime<Utc>>,
        batch: Vec<WireRecord>,
    ) -> ServerResult<SyncResponse> {
        let request = SyncRequest::new(OwnerId::new("pet"), checkpoint, batch);
        handler.handle_sync(
            &Principal::new("alice"),
            InboundSyncRequest::try_from(&request).unwrap(),
        )
    }

    /// Holds every non-empty insert until the test releases it.
    struct GatedStore {
        inner: MemoryRecordStore,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl RecordStore for GatedStore {
        fn owner_principal(&self, owner: &OwnerId) -> ServerResult<Option<Principal>> {
            self.inner.owner_principal(owner)
        }

        fn register_owner(&self, owner: &OwnerId, principal: &Principal) -> ServerResult<()> {
            self.inner.register_owner(owner, principal)
        }

        fn existing_keys(
            &self,
            owner: &OwnerId,
            keys: &[IdempotencyKey],
        ) -> ServerResult<HashSet<IdempotencyKey>> {
            self.inner.existing_keys(owner, keys)
        }

        fn insert_new(
            &self,
            owner: &OwnerId,
            records: &[WireRecord],
            now: DateTime<Utc>,
        ) -> ServerResult<InsertOutcome> {
            if !records.is_empty() {
                self.entered.lock().send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
            self.inner.insert_new(owner, records, now)
        }

        fn changes_since(
            &self,
            owner: &OwnerId,
            since: Option<DateTime<Utc>>,
            now: DateTime<Utc>,
        ) -> ServerResult<ChangeSet> {
            self.inner.changes_since(owner, since, now)
        }

        fn recent_records(
            &self,
            owner: &OwnerId,
            since: Option<DateTime<Utc>>,
            until: Option<DateTime<Utc>>,
            limit: usize,
        ) -> ServerResult<Vec<ServerRecord>> {
            self.inner.recent_records(owner, since, until, limit)
        }

        fn soft_delete(
            &self,
            owner: &OwnerId,
            id: &RecordId,
            now: DateTime<Utc>,
        ) -> ServerResult<bool> {
            self.inner.soft_delete(owner, id, now)
        }
    }

    fn record(key: &str, category: Category, fields: LogFields) -> WireRecord {
        WireRecord {
            idempotency_key: IdempotencyKey::new(key),
            category,
            timestamp: base() - Duration::hours(1),
            fields,
        }
    }

    fn three_entries() -> Vec<WireRecord> {
        vec![
            record("k-meal", Category::Meal, LogFields::default().with_quantity(80.0, "g")),
            record("k-walk", Category::Walk, LogFields::default().with_duration(30)),
            record("k-water", Category::Water, LogFields::default().with_quantity(250.0, "ml")),
        ]
    }

    #[test]
    fn first_upload_inserts_and_replay_is_all_duplicates() {
        let f = fixture();

        let first = f.sync(None, three_entries()).unwrap();
        assert_eq!(first.inserted_count, 3);
        assert_eq!(first.inserted.len(), 3);
        assert!(first.duplicate_idempotency_keys.is_empty());
        assert_eq!(first.server_changes.len(), 3);

        f.advance(1);
        let replay = f.sync(None, three_entries()).unwrap();
        assert_eq!(replay.inserted_count, 0);
        assert_eq!(replay.duplicate_idempotency_keys.len(), 3);
        assert_eq!(f.store.len(), 3);
    }

    #[test]
    fn checkpoint_is_inclusive_and_changes_are_newest_first() {
        let f = fixture();
        f.sync(None, vec![record("old", Category::Note, LogFields::default().with_notes("a"))])
            .unwrap();

        f.advance(10);
        let checkpoint = (f.handler.clock)();
        f.sync(None, vec![record("at", Category::Play, LogFields::default())])
            .unwrap();
        f.advance(10);
        f.sync(None, vec![record("after", Category::Sleep, LogFields::default())])
            .unwrap();

        let response = f.sync(Some(checkpoint), Vec::new()).unwrap();
        let keys: Vec<_> = response
            .server_changes
            .iter()
            .map(|c| c.idempotency_key.as_str())
            .collect();
        assert_eq!(keys, vec!["after", "at"]);
    }

    #[test]
    fn ownership_mismatch_rejects_everything() {
        let f = fixture();
        let request = SyncRequest::new(OwnerId::new("pet"), None, three_entries());
        let inbound = InboundSyncRequest::try_from(&request).unwrap();

        let err = f
            .handler
            .handle_sync(&Principal::new("mallory"), inbound.clone())
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));
        assert!(f.store.is_empty());

        let mut unknown = inbound;
        unknown.owner_id = OwnerId::new("stray");
        let err = f
            .handler
            .handle_sync(&Principal::new("alice"), unknown)
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));
    }

    #[test]
    fn oversized_batch_is_rejected_whole() {
        let f = fixture();
        let batch: Vec<_> = (0..11)
            .map(|i| record(&format!("k{i}"), Category::Potty, LogFields::default()))
            .collect();
        let err = f.sync(None, batch).unwrap_err();
        assert!(matches!(err, ServerError::BatchTooLarge { size: 11, max: 10 }));
        assert!(f.store.is_empty());
    }

    #[test]
    fn invalid_items_do_not_block_siblings() {
        let f = fixture();
        let request = InboundSyncRequest {
            owner_id: OwnerId::new("pet"),
            checkpoint: None,
            batch: vec![
                json!({"idempotencyKey": "good", "category": "meal", "timestamp": "2026-03-01T10:00:00Z"}),
                json!({"idempotencyKey": "heavy", "category": "weight", "timestamp": "2026-03-01T10:00:00Z"}),
                json!({"category": "meal"}),
            ],
        };
        let response = f
            .handler
            .handle_sync(&Principal::new("alice"), request)
            .unwrap();
        assert_eq!(response.inserted_count, 1);
        assert_eq!(response.rejected.len(), 2);
        assert_eq!(
            response.rejected[0].idempotency_key,
            Some(IdempotencyKey::new("heavy"))
        );
        assert!(response.rejected[0].reason.contains("quantity"));
    }

    #[test]
    fn repeated_keys_within_a_batch_insert_once() {
        let f = fixture();
        let mut batch = three_entries();
        batch.push(batch[0].clone());

        let response = f.sync(None, batch).unwrap();
        assert_eq!(response.inserted_count, 3);
        assert_eq!(
            response.duplicate_idempotency_keys,
            vec![IdempotencyKey::new("k-meal")]
        );
    }

    #[test]
    fn write_failure_reports_nothing_inserted() {
        let f = fixture();
        f.store.fail_next_write();

        let err = f.sync(None, three_entries()).unwrap_err();
        assert!(err.is_server_error());
        assert!(f.store.is_empty());

        f.advance(1);
        let retry = f.sync(None, three_entries()).unwrap();
        assert_eq!(retry.inserted_count, 3);
    }

    #[test]
    fn synced_at_is_not_before_insert_time() {
        let f = fixture();
        let response = f.sync(None, three_entries()).unwrap();
        for change in &response.server_changes {
            assert!(change.updated_at <= response.synced_at);
        }
    }

    #[test]
    fn recent_records_are_capped_and_exclude_tombstones() {
        let f = fixture();
        let batch: Vec<_> = (0..8)
            .map(|i| {
                let mut r = record(&format!("k{i}"), Category::Meal, LogFields::default());
                r.timestamp = base() - Duration::hours(10 - i);
                r
            })
            .collect();
        let response = f.sync(None, batch).unwrap();
        let newest = response
            .inserted
            .iter()
            .find(|r| r.idempotency_key.as_str() == "k7")
            .unwrap()
            .id
            .clone();
        f.handler
            .delete_record(&Principal::new("alice"), &OwnerId::new("pet"), &newest)
            .unwrap();

        let query = RecentRecordsQuery {
            limit: Some(3),
            ..Default::default()
        };
        let recent = f
            .handler
            .recent_records(&Principal::new("alice"), &OwnerId::new("pet"), &query)
            .unwrap();
        let keys: Vec<_> = recent
            .records
            .iter()
            .map(|r| r.idempotency_key.as_str())
            .collect();
        assert_eq!(keys, vec!["k6", "k5", "k4"]);
    }

    #[test]
    fn delete_requires_ownership_and_existing_record() {
        let f = fixture();
        let owner = OwnerId::new("pet");
        let missing = RecordId::new("nope");
        assert!(matches!(
            f.handler
                .delete_record(&Principal::new("alice"), &owner, &missing)
                .unwrap_err(),
            ServerError::NotFound(_)
        ));
        assert!(matches!(
            f.handler
                .delete_record(&Principal::new("bob"), &owner, &missing)
                .unwrap_err(),
            ServerError::Forbidden(_)
        ));
    }

    #[test]
    fn tombstones_reach_later_pulls() {
        let f = fixture();
        let first = f.sync(None, three_entries()).unwrap();
        let id = first.inserted[0].id.clone();

        f.advance(5);
        f.handler
            .delete_record(&Principal::new("alice"), &OwnerId::new("pet"), &id)
            .unwrap();

        let pull = f.sync(Some(first.synced_at), Vec::new()).unwrap();
        let tombstone = pull.server_changes.iter().find(|c| c.id == id).unwrap();
        assert!(tombstone.deleted);
    }

    #[test]
    fn slow_write_committing_after_a_pull_reaches_the_next_pull() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryRecordStore::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        store
            .register_owner(&OwnerId::new("pet"), &Principal::new("alice"))
            .unwrap();
        let now = Arc::new(Mutex::new(base()));
        let clock_now = Arc::clone(&now);
        let handler = Arc::new(
            SyncHandler::new(ServerConfig::default(), store)
                .with_clock(Arc::new(move || *clock_now.lock())),
        );

        // The tablet's upload reads the clock, then stalls before its insert.
        let writer = {
            let handler = Arc::clone(&handler);
            std::thread::spawn(move || {
                let batch = vec![record("k-late", Category::Walk, LogFields::default())];
                sync_with(&handler, None, batch).unwrap()
            })
        };
        entered_rx.recv().unwrap();

        // The phone pulls while the tablet's write is still in flight.
        *now.lock() += Duration::minutes(1);
        let pull = sync_with(&handler, None, Vec::new()).unwrap();
        assert!(pull.server_changes.is_empty());

        release_tx.send(()).unwrap();
        let upload = writer.join().unwrap();
        assert_eq!(upload.inserted_count, 1);

        let next = sync_with(&handler, Some(pull.synced_at), Vec::new()).unwrap();
        let keys: Vec<_> = next
            .server_changes
            .iter()
            .map(|c| c.idempotency_key.as_str())
            .collect();
        assert_eq!(keys, vec!["k-late"]);
        assert!(next.server_changes[0].updated_at >= pull.synced_at);
    }

    #[test]
    fn late_tombstone_reaches_the_next_pull() {
        let f = fixture();
        let first = f.sync(None, three_entries()).unwrap();
        let id = first.inserted[0].id.clone();

        f.advance(10);
        let pull = f.sync(None, Vec::new()).unwrap();

        // The delete's clock read lands before the pull's checkpoint.
        f.advance(-5);
        f.handler
            .delete_record(&Principal::new("alice"), &OwnerId::new("pet"), &id)
            .unwrap();

        let next = f.sync(Some(pull.synced_at), Vec::new()).unwrap();
        assert_eq!(next.server_changes.len(), 1);
        assert!(next.server_changes[0].deleted);
        assert_eq!(next.server_changes[0].id, id);
    }
}
