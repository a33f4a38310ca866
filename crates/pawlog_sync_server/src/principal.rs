//! The authenticated caller, as asserted by the fronting gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the verified principal id.
pub const PRINCIPAL_HEADER: &str = "x-authenticated-principal";

/// An authenticated account.
///
/// Credentials are verified upstream; this server only compares the
/// principal against owner registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wraps a principal id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the principal id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
