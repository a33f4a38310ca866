//! The sync coordinator.
//!
//! Drives one reconciliation cycle per owner:
//!
//! 1. Skip if a cycle for the owner is already running
//! 2. Upload every pending entry with the owner's checkpoint
//! 3. Retry transient failures with exponential backoff
//! 4. Apply the answer and advance the checkpoint in one local commit
//!
//! Nothing is marked synced and the checkpoint does not move unless the
//! server answered successfully. Running the same cycle twice converges
//! to the same local state.

use crate::config::SyncConfig;
use crate::entry::{LogEntry, SyncState};
use crate::error::{StoreResult, SyncError, SyncResult};
use crate::store::{LogStore, StoreMutation};
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use pawlog_sync_protocol::{
    IdempotencyKey, OwnerId, RecordId, RejectedItem, ServerChange, SyncDomain, SyncRequest,
    SyncResponse,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that finished successfully.
    pub cycles_completed: u64,
    /// Cycles that gave up with an error.
    pub cycles_failed: u64,
    /// Cycles skipped because another was in flight.
    pub cycles_skipped: u64,
    /// Entries acknowledged by the server.
    pub entries_uploaded: u64,
    /// Remote inserts and deletions applied locally.
    pub changes_applied: u64,
    /// Retries after transient failures.
    pub retries: u64,
    /// Last error message.
    pub last_error: Option<String>,
    /// Time of the last successful cycle.
    pub last_success: Option<DateTime<Utc>>,
}

/// What one completed cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Owner synced.
    pub owner_id: OwnerId,
    /// Entries the server inserted.
    pub inserted: usize,
    /// Entries the server already had.
    pub duplicates: usize,
    /// Entries the server refused; they stay unsynced.
    pub rejected: Vec<RejectedItem>,
    /// Server records materialized locally.
    pub remote_inserted: usize,
    /// Local entries removed because the server tombstoned them.
    pub remote_deleted: usize,
    /// Endpoint calls made, the successful one included.
    pub attempts: u32,
    /// The new checkpoint.
    pub synced_at: DateTime<Utc>,
}

/// Result of [`SyncCoordinator::run_cycle`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle for the owner was already running.
    Skipped,
    /// The cycle finished.
    Completed(CycleReport),
}

/// Informational sync status of one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerStatus {
    /// Owner.
    pub owner_id: OwnerId,
    /// Entries waiting for upload.
    pub pending: usize,
    /// Last successful pull.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Whether a cycle is running now.
    pub in_flight: bool,
    /// Whether background triggers sync this owner.
    pub tracked: bool,
}

/// Marks an owner as in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<OwnerId>>,
    owner: OwnerId,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<OwnerId>>, owner: &OwnerId) -> Option<Self> {
        if set.lock().insert(owner.clone()) {
            Some(Self {
                set,
                owner: owner.clone(),
            })
        } else {
            None
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.owner);
    }
}

/// Coordinates sync cycles between a local store and the server.
pub struct SyncCoordinator<S: LogStore, T: SyncTransport> {
    config: SyncConfig,
    store: Arc<S>,
    transport: Arc<T>,
    in_flight: Mutex<HashSet<OwnerId>>,
    tracked: RwLock<BTreeSet<OwnerId>>,
    stats: RwLock<SyncStats>,
}

impl<S: LogStore, T: SyncTransport> SyncCoordinator<S, T> {
    /// Creates a coordinator.
    pub fn new(config: SyncConfig, store: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            config,
            store,
            transport,
            in_flight: Mutex::new(HashSet::new()),
            tracked: RwLock::new(BTreeSet::new()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Includes an owner in background syncs.
    pub fn track_owner(&self, owner: OwnerId) {
        self.tracked.write().insert(owner);
    }

    /// Excludes an owner from background syncs.
    pub fn untrack_owner(&self, owner: &OwnerId) {
        self.tracked.write().remove(owner);
    }

    /// Owners included in background syncs.
    pub fn tracked_owners(&self) -> Vec<OwnerId> {
        self.tracked.read().iter().cloned().collect()
    }

    /// Returns the owner's sync status.
    pub fn status(&self, owner: &OwnerId) -> StoreResult<OwnerStatus> {
        Ok(OwnerStatus {
            owner_id: owner.clone(),
            pending: self.store.pending_count(owner)?,
            checkpoint: self.store.checkpoint(owner)?,
            in_flight: self.in_flight.lock().contains(owner),
            tracked: self.tracked.read().contains(owner),
        })
    }

    /// Runs a cycle for a record domain.
    ///
    /// Domains without a server endpoint fail with
    /// [`SyncError::PendingFeature`] and touch nothing.
    pub async fn run_domain_cycle(
        &self,
        domain: SyncDomain,
        owner: &OwnerId,
    ) -> SyncResult<CycleOutcome> {
        if !domain.is_available() {
            warn!(%domain, owner = %owner, "sync requested for a domain without an endpoint");
            return Err(SyncError::PendingFeature(domain));
        }
        self.run_cycle(owner).await
    }

    /// Runs one sync cycle for `owner`.
    pub async fn run_cycle(&self, owner: &OwnerId) -> SyncResult<CycleOutcome> {
        let Some(_guard) = InFlight::acquire(&self.in_flight, owner) else {
            debug!(owner = %owner, "cycle already in flight, skipping");
            self.stats.write().cycles_skipped += 1;
            return Ok(CycleOutcome::Skipped);
        };

        match self.cycle(owner).await {
            Ok(report) => {
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.entries_uploaded += (report.inserted + report.duplicates) as u64;
                stats.changes_applied += (report.remote_inserted + report.remote_deleted) as u64;
                stats.last_success = Some(Utc::now());
                stats.last_error = None;
                drop(stats);

                info!(
                    owner = %owner,
                    inserted = report.inserted,
                    duplicates = report.duplicates,
                    rejected = report.rejected.len(),
                    remote_inserted = report.remote_inserted,
                    remote_deleted = report.remote_deleted,
                    attempts = report.attempts,
                    "sync cycle completed"
                );
                Ok(CycleOutcome::Completed(report))
            }
            Err(err) => {
                let mut stats = self.stats.write();
                stats.cycles_failed += 1;
                stats.last_error = Some(err.to_string());
                drop(stats);

                warn!(owner = %owner, error = %err, "sync cycle failed");
                Err(err)
            }
        }
    }

    /// Runs a cycle for every tracked owner, one after another.
    ///
    /// Failures are logged and counted; they never stop the sweep.
    pub async fn sync_tracked(&self) -> Vec<(OwnerId, SyncResult<CycleOutcome>)> {
        let mut results = Vec::new();
        for owner in self.tracked_owners() {
            let result = self.run_cycle(&owner).await;
            results.push((owner, result));
        }
        results
    }

    async fn cycle(&self, owner: &OwnerId) -> SyncResult<CycleReport> {
        let pending = self.store.fetch_pending(owner)?;
        let checkpoint = self.store.checkpoint(owner)?;
        debug!(
            owner = %owner,
            pending = pending.len(),
            checkpoint = ?checkpoint,
            "starting sync cycle"
        );

        let request = SyncRequest::new(
            owner.clone(),
            checkpoint,
            pending.iter().map(LogEntry::to_wire).collect(),
        );

        let (response, attempts) = self.call_with_retry(&request).await?;
        let (mutations, report) = self.plan(owner, &pending, &response, attempts)?;
        debug!(owner = %owner, mutations = mutations.len(), "applying sync result");
        self.store.commit(mutations)?;
        Ok(report)
    }

    async fn call_with_retry(&self, request: &SyncRequest) -> SyncResult<(SyncResponse, u32)> {
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            let call = self.transport.sync(request);
            let result = match tokio::time::timeout(self.config.timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout),
            };

            match result {
                Ok(response) => return Ok((response, attempt)),
                Err(err) if err.is_retryable() && attempt < retry.max_attempts => {
                    self.stats.write().retries += 1;
                    warn!(
                        owner = %request.owner_id,
                        attempt,
                        max_attempts = retry.max_attempts,
                        error = %err,
                        "sync call failed, will retry"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Turns a server answer into one list of local mutations.
    fn plan(
        &self,
        owner: &OwnerId,
        pending: &[LogEntry],
        response: &SyncResponse,
        attempts: u32,
    ) -> SyncResult<(Vec<StoreMutation>, CycleReport)> {
        let synced_at = response.synced_at;
        let pending_by_key: HashMap<&IdempotencyKey, &LogEntry> =
            pending.iter().map(|e| (&e.idempotency_key, e)).collect();
        let change_by_key: HashMap<&IdempotencyKey, &ServerChange> = response
            .server_changes
            .iter()
            .map(|c| (&c.idempotency_key, c))
            .collect();

        let mut mutations = Vec::new();
        let mut acknowledged: HashSet<&IdempotencyKey> = HashSet::new();
        let mut report = CycleReport {
            owner_id: owner.clone(),
            inserted: 0,
            duplicates: 0,
            rejected: response.rejected.clone(),
            remote_inserted: 0,
            remote_deleted: 0,
            attempts,
            synced_at,
        };

        for inserted in &response.inserted {
            if let Some(&entry) = pending_by_key.get(&inserted.idempotency_key) {
                if acknowledged.insert(&entry.idempotency_key) {
                    mutations.push(StoreMutation::MarkSynced {
                        id: entry.id,
                        remote_id: Some(inserted.id.clone()),
                        synced_at,
                    });
                    report.inserted += 1;
                }
            }
        }

        for key in &response.duplicate_idempotency_keys {
            if let Some(&entry) = pending_by_key.get(key) {
                if acknowledged.insert(&entry.idempotency_key) {
                    let remote_id: Option<RecordId> =
                        change_by_key.get(key).map(|c| c.id.clone());
                    mutations.push(StoreMutation::MarkSynced {
                        id: entry.id,
                        remote_id,
                        synced_at,
                    });
                    report.duplicates += 1;
                }
            }
        }

        for rejected in &response.rejected {
            warn!(
                owner = %owner,
                key = ?rejected.idempotency_key,
                reason = %rejected.reason,
                "entry rejected by server, keeping it unsynced"
            );
        }

        let mut planned: HashSet<&IdempotencyKey> = HashSet::new();
        for change in &response.server_changes {
            if !planned.insert(&change.idempotency_key) {
                continue;
            }
            let local_by_key = self
                .store
                .find_by_idempotency_key(owner, &change.idempotency_key)?;

            if change.deleted {
                if local_by_key.is_some() {
                    mutations.push(StoreMutation::DeleteByKey {
                        owner_id: owner.clone(),
                        key: change.idempotency_key.clone(),
                    });
                    report.remote_deleted += 1;
                } else if self.store.find_by_remote_id(&change.id)?.is_some() {
                    mutations.push(StoreMutation::DeleteByRemoteId(change.id.clone()));
                    report.remote_deleted += 1;
                }
                continue;
            }

            if local_by_key.is_none() && self.store.find_by_remote_id(&change.id)?.is_none() {
                mutations.push(StoreMutation::UpsertFromRemote(LogEntry::from_remote(
                    owner.clone(),
                    change,
                    synced_at,
                )));
                report.remote_inserted += 1;
            } else if let Some(local) = local_by_key {
                // Synced earlier but the remote id was never learned.
                if local.sync_state == SyncState::Synced && local.remote_id.is_none() {
                    mutations.push(StoreMutation::MarkSynced {
                        id: local.id,
                        remote_id: Some(change.id.clone()),
                        synced_at: local.last_synced_at.unwrap_or(synced_at),
                    });
                }
            }
        }

        mutations.push(StoreMutation::SetCheckpoint {
            owner_id: owner.clone(),
            at: synced_at,
        });

        Ok((mutations, report))
    }
}
