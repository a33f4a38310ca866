//! CLI command implementations.

pub mod pending;
pub mod record;
pub mod serve;
pub mod sync;
