//! # PawLog Sync Engine
//!
//! Offline-first client side of PawLog sync.
//!
//! This crate provides:
//! - A durable local log store (append-only journal, atomic commits)
//! - The sync coordinator (single-flight cycles, retry with backoff)
//! - Transport abstraction with an HTTP implementation
//! - A connectivity monitor and a periodic scheduler
//!
//! ## Architecture
//!
//! Entries are always written locally first and marked unsynced. A cycle
//! uploads every pending entry together with the owner's checkpoint; the
//! server answers with what it inserted, what it already had, what it
//! rejected, and every record changed at or after the checkpoint. The
//! coordinator applies that answer in one local commit.
//!
//! ## Key Invariants
//!
//! - The server is authoritative for record identity
//! - Idempotency keys are unique per owner, locally and on the server
//! - Nothing is marked synced unless the server acknowledged it
//! - The checkpoint only advances together with the rest of a cycle
//! - At most one cycle per owner is in flight

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod coordinator;
mod entry;
mod error;
mod http;
mod scheduler;
mod store;
mod transport;

pub use config::{RetryConfig, SyncConfig, DEFAULT_SYNC_INTERVAL, MIN_SYNC_INTERVAL};
pub use connectivity::{ConnectivityMonitor, Reachability};
pub use coordinator::{CycleOutcome, CycleReport, OwnerStatus, SyncCoordinator, SyncStats};
pub use entry::{EntryId, LogEntry, SyncState};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use http::HttpTransport;
pub use scheduler::{SyncScheduler, SYNC_INTERVAL_JITTER};
pub use store::{JournalLogStore, LogStore, StoreMutation};
pub use transport::{MockTransport, SyncTransport};
