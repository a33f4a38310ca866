//! Server configuration.

use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default maximum number of items accepted in one sync batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Default cap on the recent-records query.
pub const DEFAULT_RECENT_RECORDS_CAP: usize = 50;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum items per sync batch. Larger batches are rejected whole.
    pub max_batch_size: usize,
    /// Maximum records returned by the recent-records query.
    pub recent_records_cap: usize,
    /// SQLite database path. `None` keeps records in memory.
    pub db_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            recent_records_cap: DEFAULT_RECENT_RECORDS_CAP,
            db_path: None,
        }
    }

    /// Reads configuration from `PAWLOG_*` environment variables.
    pub fn from_env() -> ServerResult<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let mut config = Self::default();

        if let Some(addr) = non_empty(&lookup, "PAWLOG_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| invalid("PAWLOG_BIND_ADDR", &addr))?;
        }
        if let Some(path) = non_empty(&lookup, "PAWLOG_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(max) = non_empty(&lookup, "PAWLOG_MAX_BATCH") {
            config.max_batch_size = parse_positive("PAWLOG_MAX_BATCH", &max)?;
        }
        if let Some(cap) = non_empty(&lookup, "PAWLOG_RECENT_CAP") {
            config.recent_records_cap = parse_positive("PAWLOG_RECENT_CAP", &cap)?;
        }

        Ok(config)
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Sets the recent-records cap.
    pub fn with_recent_records_cap(mut self, cap: usize) -> Self {
        self.recent_records_cap = cap;
        self
    }

    /// Sets the SQLite database path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive(name: &str, value: &str) -> ServerResult<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(name, value)),
    }
}

fn invalid(name: &str, value: &str) -> ServerError {
    ServerError::InvalidRequest(format!("invalid value for {name}: {value:?}"))
}
