//! Server assembly.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::SyncHandler;
use crate::principal::Principal;
use crate::routes::{app_router, AppState};
use crate::store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use axum::Router;
use pawlog_sync_protocol::OwnerId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The sync server.
///
/// Owns the handler and exposes it over HTTP.
///
/// # Example
///
/// ```
/// use pawlog_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::open(ServerConfig::default()).unwrap();
/// let _router = server.router();
/// ```
pub struct SyncServer {
    handler: Arc<SyncHandler>,
}

impl SyncServer {
    /// Opens the record store named by the configuration.
    ///
    /// Uses SQLite when `db_path` is set, otherwise keeps records in memory.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let store: Arc<dyn RecordStore> = match &config.db_path {
            Some(path) => {
                info!(path = %path.display(), "opening sqlite record store");
                Arc::new(SqliteRecordStore::open(path)?)
            }
            None => {
                info!("using in-memory record store");
                Arc::new(MemoryRecordStore::new())
            }
        };
        Ok(Self::with_store(config, store))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            handler: Arc::new(SyncHandler::new(config, store)),
        }
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &Arc<SyncHandler> {
        &self.handler
    }

    /// Registers an owner to a principal.
    pub fn register_owner(&self, owner: &OwnerId, principal: &Principal) -> ServerResult<()> {
        self.handler.store().register_owner(owner, principal)
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        app_router(AppState::new(Arc::clone(&self.handler)))
    }

    /// Binds the configured address and serves until the task is dropped.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.handler.config().bind_addr).await?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> ServerResult<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(%addr, "pawlog sync server listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
