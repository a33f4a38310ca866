//! Reachability tracking.
//!
//! The host platform reports network reachability through
//! [`ConnectivityMonitor::set`]. When the server becomes reachable again
//! the monitor fires a sync cycle for every tracked owner. Cycles run as
//! detached tasks; their failures are only logged.

use crate::coordinator::{CycleOutcome, SyncCoordinator};
use crate::store::LogStore;
use crate::transport::SyncTransport;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Whether the sync server can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    /// No route to the server.
    Unreachable,
    /// The server can be reached.
    Reachable,
}

impl Reachability {
    /// Returns true if reachable.
    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

/// Broadcasts reachability changes.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<Reachability>,
}

impl ConnectivityMonitor {
    /// Creates a monitor in the given initial state.
    pub fn new(initial: Reachability) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current reachability.
    pub fn current(&self) -> Reachability {
        *self.sender.borrow()
    }

    /// Records a new reachability state.
    ///
    /// Returns true if the state changed.
    pub fn set(&self, reachability: Reachability) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == reachability {
                false
            } else {
                debug!(from = ?*current, to = ?reachability, "reachability changed");
                *current = reachability;
                true
            }
        })
    }

    /// Subscribes to reachability changes.
    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.sender.subscribe()
    }

    /// Spawns the task that syncs tracked owners whenever the server
    /// becomes reachable.
    ///
    /// The task ends when the monitor is dropped.
    pub fn spawn<S, T>(&self, coordinator: Arc<SyncCoordinator<S, T>>) -> JoinHandle<()>
    where
        S: LogStore + 'static,
        T: SyncTransport + 'static,
    {
        let mut receiver = self.subscribe();
        let mut last = *receiver.borrow_and_update();
        tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let now = *receiver.borrow_and_update();
                if now.is_reachable() && !last.is_reachable() {
                    trigger_tracked(&coordinator);
                }
                last = now;
            }
            debug!("connectivity monitor stopped");
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Reachability::Unreachable)
    }
}

fn trigger_tracked<S, T>(coordinator: &Arc<SyncCoordinator<S, T>>)
where
    S: LogStore + 'static,
    T: SyncTransport + 'static,
{
    let owners = coordinator.tracked_owners();
    info!(owners = owners.len(), "server reachable, triggering sync");

    for owner in owners {
        let coordinator = Arc::clone(coordinator);
        tokio::spawn(async move {
            match coordinator.run_cycle(&owner).await {
                Ok(CycleOutcome::Completed(_)) => {}
                Ok(CycleOutcome::Skipped) => {
                    debug!(owner = %owner, "reconnect sync skipped, cycle in flight")
                }
                Err(err) => warn!(owner = %owner, error = %err, "reconnect sync failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SyncConfig};
    use crate::entry::LogEntry;
    use crate::store::JournalLogStore;
    use crate::transport::MockTransport;
    use chrono::Utc;
    use pawlog_storage::InMemoryBackend;
    use pawlog_sync_protocol::{Category, LogFields, OwnerId, SyncResponse};
    use std::time::Duration;

    #[test]
    fn set_reports_changes_only() {
        let monitor = ConnectivityMonitor::default();
        assert_eq!(monitor.current(), Reachability::Unreachable);
        assert!(!monitor.set(Reachability::Unreachable));
        assert!(monitor.set(Reachability::Reachable));
        assert!(!monitor.set(Reachability::Reachable));
        assert!(monitor.current().is_reachable());
    }

    #[tokio::test]
    async fn reconnect_triggers_tracked_owners() {
        let store: Arc<JournalLogStore<InMemoryBackend>> = Arc::new(JournalLogStore::in_memory());
        let transport = Arc::new(MockTransport::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            SyncConfig::new("mock://").with_retry(RetryConfig::no_retry()),
            Arc::clone(&store),
            Arc::clone(&transport),
        ));

        let owner = OwnerId::new("pet");
        store
            .insert(LogEntry::new(
                owner.clone(),
                Category::Walk,
                Utc::now(),
                LogFields::default().with_duration(20),
            ))
            .unwrap();
        coordinator.track_owner(owner.clone());
        transport.push_response(SyncResponse {
            inserted_count: 0,
            inserted: Vec::new(),
            duplicate_idempotency_keys: Vec::new(),
            rejected: Vec::new(),
            server_changes: Vec::new(),
            synced_at: Utc::now(),
        });

        let monitor = ConnectivityMonitor::default();
        let handle = monitor.spawn(Arc::clone(&coordinator));
        tokio::task::yield_now().await;
        assert_eq!(transport.calls(), 0);

        monitor.set(Reachability::Reachable);
        for _ in 0..100 {
            if coordinator.stats().cycles_completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.calls(), 1);
        assert!(store.checkpoint(&owner).unwrap().is_some());

        drop(monitor);
        handle.await.unwrap();
    }
}
