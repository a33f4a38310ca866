//! Periodic sync trigger.

use crate::config::{SyncConfig, MIN_SYNC_INTERVAL};
use crate::connectivity::Reachability;
use crate::coordinator::SyncCoordinator;
use crate::store::LogStore;
use crate::transport::SyncTransport;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Maximum jitter added to each periodic cycle.
pub const SYNC_INTERVAL_JITTER: Duration = Duration::from_secs(5);

/// Runs [`SyncCoordinator::sync_tracked`] at a fixed cadence while the
/// server is reachable.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    interval: Duration,
    max_jitter: Duration,
}

impl SyncScheduler {
    /// Creates a scheduler with the given cadence and default jitter.
    ///
    /// Cadences below [`MIN_SYNC_INTERVAL`] are raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_SYNC_INTERVAL),
            max_jitter: SYNC_INTERVAL_JITTER,
        }
    }

    /// Creates a scheduler with the cadence from `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.sync_interval)
    }

    /// Sets the maximum jitter. Zero disables it.
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the cadence.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let millis = self.max_jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// Spawns the periodic task.
    ///
    /// The first cycle runs one interval after spawning. Ticks are skipped
    /// while `reachability` reports the server unreachable. Abort the
    /// returned handle to stop.
    pub fn spawn<S, T>(
        self,
        coordinator: Arc<SyncCoordinator<S, T>>,
        reachability: watch::Receiver<Reachability>,
    ) -> JoinHandle<()>
    where
        S: LogStore + 'static,
        T: SyncTransport + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let reachable = reachability.borrow().is_reachable();
                if !reachable {
                    debug!("server unreachable, skipping periodic sync");
                    continue;
                }

                let jitter = self.jitter();
                if !jitter.is_zero() {
                    tokio::time::sleep(jitter).await;
                }

                for (owner, result) in coordinator.sync_tracked().await {
                    if let Err(err) = result {
                        warn!(owner = %owner, error = %err, "periodic sync failed");
                    }
                }
            }
        })
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SYNC_INTERVAL)
    }
}
