//! # PawLog Storage
//!
//! Append-only journal backends for the PawLog local log store.
//!
//! The local log store persists every mutation as a checksummed frame
//! appended to a journal. This crate owns the byte-level side of that:
//!
//! - [`JournalBackend`] - the durable byte sink the journal is written to
//! - [`FileBackend`] - a file on disk, fsynced on every append
//! - [`InMemoryBackend`] - a shared in-memory buffer for tests
//! - [`frame`] - frame envelope encoding and torn-tail aware scanning
//!
//! Backends do not interpret frame payloads. Payload encoding belongs to
//! the log store.
//!
//! ## Example
//!
//! ```rust
//! use pawlog_storage::{frame, InMemoryBackend, JournalBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append_durable(&frame::encode(b"entry").unwrap()).unwrap();
//!
//! let scan = frame::scan(&backend.read_all().unwrap()).unwrap();
//! assert_eq!(scan.payloads, vec![b"entry".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
pub mod frame;
mod memory;

pub use backend::JournalBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
