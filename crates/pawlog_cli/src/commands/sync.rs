//! Sync command implementation.

use pawlog_sync_engine::{
    CycleOutcome, HttpTransport, JournalLogStore, LogStore, RetryConfig, SyncConfig,
    SyncCoordinator,
};
use pawlog_sync_protocol::{OwnerId, SyncDomain};
use pawlog_sync_server::PRINCIPAL_HEADER;
use std::path::Path;
use std::sync::Arc;

/// Connection options for one sync run.
#[derive(Debug)]
pub struct Options {
    /// Server base URL.
    pub server: String,
    /// Bearer token passed to the gateway.
    pub token: Option<String>,
    /// Principal header for servers without a gateway.
    pub principal: Option<String>,
    /// Record domain to sync.
    pub domain: SyncDomain,
    /// Maximum attempts for transient failures.
    pub attempts: u32,
}

/// Runs one sync cycle for `owner` and prints what it did.
pub fn run(path: &Path, owner: &str, options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let retry = RetryConfig::new(options.attempts);
    let mut config = SyncConfig::new(options.server).with_retry(retry);
    if let Some(token) = options.token {
        config = config.with_auth_token(token);
    }

    let transport = match &options.principal {
        Some(principal) => {
            let headers = HttpTransport::header(PRINCIPAL_HEADER, principal)?;
            HttpTransport::with_headers(&config, headers)?
        }
        None => HttpTransport::new(&config)?,
    };
    let store = Arc::new(JournalLogStore::open_path(path)?);
    let coordinator = SyncCoordinator::new(config, Arc::clone(&store), Arc::new(transport));
    let owner = OwnerId::new(owner);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(coordinator.run_domain_cycle(options.domain, &owner))?;

    match outcome {
        CycleOutcome::Skipped => println!("A sync for {owner} is already running"),
        CycleOutcome::Completed(report) => {
            println!("Synced {} at {}", report.owner_id, report.synced_at.to_rfc3339());
            println!("  Uploaded:        {}", report.inserted);
            println!("  Already present: {}", report.duplicates);
            println!("  Rejected:        {}", report.rejected.len());
            for item in &report.rejected {
                println!("    #{}: {}", item.index, item.reason);
            }
            println!("  Received:        {}", report.remote_inserted);
            println!("  Removed:         {}", report.remote_deleted);
            println!("  Attempts:        {}", report.attempts);
        }
    }
    println!("Pending uploads: {}", store.pending_count(&owner)?);
    Ok(())
}
