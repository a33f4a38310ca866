//! PawLog CLI
//!
//! Command-line tools for PawLog sync.
//!
//! # Commands
//!
//! - `serve` - Run the sync server
//! - `record` - Append a log entry to a local journal
//! - `pending` - Show entries waiting for upload
//! - `sync` - Run one sync cycle against a server

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use pawlog_sync_protocol::{Category, SyncDomain};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PawLog offline-first sync tools.
#[derive(Parser)]
#[command(name = "pawlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local journal file
    #[arg(global = true, short, long)]
    journal: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync server
    Serve {
        /// Address to listen on (overrides PAWLOG_BIND_ADDR)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// SQLite database path (overrides PAWLOG_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Register an owner to a principal, as `owner:principal`
        #[arg(long = "owner", value_name = "OWNER:PRINCIPAL")]
        owners: Vec<String>,
    },

    /// Append a log entry to the local journal
    Record {
        /// Owner (pet) id
        #[arg(short, long)]
        owner: String,

        /// Entry category (meal, walk, water, weight, ...)
        #[arg(short, long, value_parser = parse_category)]
        category: Category,

        /// Event time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Measured quantity
        #[arg(long)]
        quantity: Option<f64>,

        /// Unit of the quantity
        #[arg(long, requires = "quantity")]
        unit: Option<String>,

        /// Duration in minutes
        #[arg(long)]
        duration: Option<u32>,

        /// Severity from 1 to 5
        #[arg(long)]
        severity: Option<u8>,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show entries waiting for upload
    Pending {
        /// Owner (pet) id
        #[arg(short, long)]
        owner: String,

        /// List synced entries too
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one sync cycle
    Sync {
        /// Owner (pet) id
        #[arg(short, long)]
        owner: String,

        /// Server base URL
        #[arg(short, long)]
        server: String,

        /// Bearer token passed to the gateway
        #[arg(long)]
        token: Option<String>,

        /// Principal header for servers without a gateway
        #[arg(long)]
        principal: Option<String>,

        /// Record domain to sync
        #[arg(long, value_enum, default_value = "logs")]
        domain: DomainArg,

        /// Maximum attempts for transient failures
        #[arg(long, default_value = "3")]
        attempts: u32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DomainArg {
    Logs,
    Reminders,
    CarePlans,
}

impl From<DomainArg> for SyncDomain {
    fn from(arg: DomainArg) -> Self {
        match arg {
            DomainArg::Logs => SyncDomain::Logs,
            DomainArg::Reminders => SyncDomain::Reminders,
            DomainArg::CarePlans => SyncDomain::CarePlans,
        }
    }
}

fn parse_category(s: &str) -> Result<Category, String> {
    s.parse()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { bind, db, owners } => {
            commands::serve::run(bind, db, &owners)?;
        }
        Commands::Record {
            owner,
            category,
            at,
            quantity,
            unit,
            duration,
            severity,
            notes,
        } => {
            let path = cli.journal.ok_or("Journal path required for record")?;
            let fields = commands::record::Fields {
                quantity,
                unit,
                duration,
                severity,
                notes,
            };
            commands::record::run(&path, &owner, category, at, fields)?;
        }
        Commands::Pending { owner, all, format } => {
            let path = cli.journal.ok_or("Journal path required for pending")?;
            commands::pending::run(&path, &owner, all, &format)?;
        }
        Commands::Sync {
            owner,
            server,
            token,
            principal,
            domain,
            attempts,
        } => {
            let path = cli.journal.ok_or("Journal path required for sync")?;
            let options = commands::sync::Options {
                server,
                token,
                principal,
                domain: domain.into(),
                attempts,
            };
            commands::sync::run(&path, &owner, options)?;
        }
    }

    Ok(())
}
