//! Serve command implementation.

use pawlog_sync_protocol::OwnerId;
use pawlog_sync_server::{Principal, ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Runs the sync server until interrupted.
///
/// Settings come from the `PAWLOG_*` environment variables; flags given
/// on the command line take precedence.
pub fn run(
    bind: Option<SocketAddr>,
    db: Option<PathBuf>,
    owners: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(db) = db {
        config = config.with_db_path(db);
    }

    let server = SyncServer::open(config)?;
    for pair in owners {
        let (owner, principal) = parse_owner(pair)?;
        server.register_owner(&owner, &principal)?;
        info!(owner = %owner, principal = %principal, "registered owner");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        tokio::select! {
            result = server.serve() => result.map_err(Into::into),
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                Ok(())
            }
        }
    })
}

fn parse_owner(pair: &str) -> Result<(OwnerId, Principal), String> {
    match pair.split_once(':') {
        Some((owner, principal)) if !owner.is_empty() && !principal.is_empty() => {
            Ok((OwnerId::new(owner), Principal::new(principal)))
        }
        _ => Err(format!("expected OWNER:PRINCIPAL, got {pair:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_specs() {
        let (owner, principal) = parse_owner("rex:alice").unwrap();
        assert_eq!(owner, OwnerId::new("rex"));
        assert_eq!(principal, Principal::new("alice"));

        assert!(parse_owner("rex").is_err());
        assert!(parse_owner(":alice").is_err());
        assert!(parse_owner("rex:").is_err());
    }
}
