//! # PawLog Sync Protocol
//!
//! Wire types and validation for the PawLog log sync protocol.
//!
//! This crate provides:
//! - Identifier newtypes (`OwnerId`, `IdempotencyKey`, `RecordId`)
//! - `Category` and its type-specific `LogFields`
//! - Request/response messages for the sync endpoint and the read-only
//!   recent-records query
//! - Per-item batch validation
//!
//! This is a pure protocol crate with no I/O operations. Messages are
//! JSON with camelCase keys and RFC 3339 timestamps.
//!
//! ## Protocol summary
//!
//! One call does both directions: the client uploads its pending batch
//! with its last checkpoint, and the server answers with what it inserted,
//! which keys it already had, and every record changed at or after the
//! checkpoint (tombstones included). `syncedAt` becomes the next checkpoint.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod category;
mod domain;
mod error;
mod ids;
mod messages;
mod validation;

pub use category::{Category, LogFields};
pub use domain::SyncDomain;
pub use error::{ProtocolError, ProtocolResult, ValidationError};
pub use ids::{IdempotencyKey, OwnerId, RecordId};
pub use messages::{
    InboundSyncRequest, InsertedRecord, RecentRecordsQuery, RecentRecordsResponse, RejectedItem,
    ServerChange, SyncRequest, SyncResponse, WireRecord,
};
pub use validation::{
    validate_record, MAX_FUTURE_SKEW_HOURS, MAX_IDEMPOTENCY_KEY_LEN, MAX_NOTES_LEN,
};
