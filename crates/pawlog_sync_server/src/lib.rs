//! # PawLog Sync Server
//!
//! Authoritative record store and sync endpoint for PawLog.
//!
//! This crate provides:
//! - The sync endpoint handler (ownership check, per-item validation,
//!   idempotent batch insert, incremental pull)
//! - Record stores: in-memory and SQLite
//! - Axum routes for sync, the recent-records query and soft delete
//!
//! # Authentication
//!
//! Credentials are verified by a fronting gateway, which attaches the
//! principal id in the `x-authenticated-principal` header. Requests
//! without it are answered with 401. Every request re-checks that the
//! target owner is registered to that principal.
//!
//! # Deduplication
//!
//! The `(owner, idempotency key)` uniqueness constraint in the record
//! store is the only deduplication mechanism. A retried upload, or two
//! clients racing with the same key, yields one record and a duplicate
//! report for the loser.
//!
//! # Checkpoints
//!
//! Writes are stamped inside the store's write lock, and `syncedAt` is
//! taken under the same lock as the pull query. Any write that commits
//! after a pull is stamped at or after the checkpoint that pull returned,
//! so the inclusive `updated_at >= checkpoint` query never skips it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod principal;
mod routes;
mod server;
mod store;

pub use config::{ServerConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_RECENT_RECORDS_CAP};
pub use error::{ServerError, ServerResult};
pub use handler::{Clock, SyncHandler};
pub use principal::{Principal, PRINCIPAL_HEADER};
pub use routes::{app_router, AppState};
pub use server::SyncServer;
pub use store::{
    ChangeSet, InsertOutcome, MemoryRecordStore, RecordStore, ServerRecord, SqliteRecordStore,
};
