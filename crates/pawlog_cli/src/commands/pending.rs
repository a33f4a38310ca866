//! Pending command implementation.

use chrono::{DateTime, Utc};
use pawlog_sync_engine::{JournalLogStore, LogEntry, LogStore, SyncState};
use pawlog_sync_protocol::OwnerId;
use serde::Serialize;
use std::path::Path;

/// Journal listing for one owner.
#[derive(Debug, Serialize)]
pub struct PendingReport {
    /// Owner listed.
    pub owner_id: String,
    /// Entries waiting for upload.
    pub pending: usize,
    /// Last successful pull.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Listed entries.
    pub entries: Vec<EntryRow>,
}

/// One listed entry.
#[derive(Debug, Serialize)]
pub struct EntryRow {
    /// Local id.
    pub id: String,
    /// Category name.
    pub category: String,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Whether the server acknowledged it.
    pub synced: bool,
    /// Server id, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl From<&LogEntry> for EntryRow {
    fn from(entry: &LogEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            category: entry.category.to_string(),
            timestamp: entry.timestamp,
            synced: entry.sync_state == SyncState::Synced,
            remote_id: entry.remote_id.as_ref().map(ToString::to_string),
        }
    }
}

/// Runs the pending command.
pub fn run(
    path: &Path,
    owner: &str,
    all: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {:?}", path).into());
    }
    let store = JournalLogStore::open_path(path)?;
    let report = build_report(&store, &OwnerId::new(owner), all)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn build_report<S: LogStore>(
    store: &S,
    owner: &OwnerId,
    all: bool,
) -> Result<PendingReport, Box<dyn std::error::Error>> {
    let entries = if all {
        store.entries(owner)?
    } else {
        store.fetch_pending(owner)?
    };
    Ok(PendingReport {
        owner_id: owner.to_string(),
        pending: store.pending_count(owner)?,
        checkpoint: store.checkpoint(owner)?,
        entries: entries.iter().map(EntryRow::from).collect(),
    })
}

fn print_text(report: &PendingReport) {
    println!("Owner: {}", report.owner_id);
    println!("Pending uploads: {}", report.pending);
    match report.checkpoint {
        Some(at) => println!("Last pull: {}", at.to_rfc3339()),
        None => println!("Last pull: never"),
    }
    for row in &report.entries {
        let state = if row.synced { "synced" } else { "pending" };
        println!(
            "  {}  {:<10} {}  {}",
            row.timestamp.to_rfc3339(),
            row.category,
            state,
            row.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawlog_sync_protocol::{Category, LogFields, RecordId};

    #[test]
    fn report_lists_pending_or_all() {
        let store = JournalLogStore::in_memory();
        let owner = OwnerId::new("rex");
        let meal = LogEntry::new(owner.clone(), Category::Meal, Utc::now(), LogFields::default());
        let walk = LogEntry::new(owner.clone(), Category::Walk, Utc::now(), LogFields::default());
        store.insert(meal.clone()).unwrap();
        store.insert(walk).unwrap();
        store
            .mark_synced(meal.id, Some(RecordId::new("r-1")), Utc::now())
            .unwrap();

        let pending = build_report(&store, &owner, false).unwrap();
        assert_eq!(pending.pending, 1);
        assert_eq!(pending.entries.len(), 1);
        assert!(!pending.entries[0].synced);

        let all = build_report(&store, &owner, true).unwrap();
        assert_eq!(all.entries.len(), 2);
        assert!(all
            .entries
            .iter()
            .any(|row| row.remote_id.as_deref() == Some("r-1")));
    }
}
