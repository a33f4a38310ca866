//! Record kinds that may reuse the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A family of records synchronized through this engine.
///
/// Only domains with a real server endpoint can be synced. The others are
/// declared so callers get an explicit "pending feature" answer instead of
/// records being quietly marked as synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    /// Pet health log entries.
    Logs,
    /// Reminders. No server endpoint yet.
    Reminders,
    /// Care plans. No server endpoint yet.
    CarePlans,
}

impl SyncDomain {
    /// Returns the endpoint path, or `None` if the domain has no endpoint.
    #[must_use]
    pub const fn endpoint_path(self) -> Option<&'static str> {
        match self {
            SyncDomain::Logs => Some("/v1/sync"),
            SyncDomain::Reminders | SyncDomain::CarePlans => None,
        }
    }

    /// Whether the domain can be synced.
    #[must_use]
    pub const fn is_available(self) -> bool {
        self.endpoint_path().is_some()
    }
}

impl fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncDomain::Logs => "logs",
            SyncDomain::Reminders => "reminders",
            SyncDomain::CarePlans => "care_plans",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_logs_has_an_endpoint() {
        assert!(SyncDomain::Logs.is_available());
        assert!(!SyncDomain::Reminders.is_available());
        assert!(!SyncDomain::CarePlans.is_available());
    }
}
