//! Record command implementation.

use chrono::{DateTime, Utc};
use pawlog_sync_engine::{JournalLogStore, LogEntry, LogStore};
use pawlog_sync_protocol::{validate_record, Category, LogFields, OwnerId};
use std::path::Path;

/// Optional fields given on the command line.
#[derive(Debug, Default)]
pub struct Fields {
    /// Measured quantity.
    pub quantity: Option<f64>,
    /// Unit of the quantity.
    pub unit: Option<String>,
    /// Duration in minutes.
    pub duration: Option<u32>,
    /// Severity from 1 to 5.
    pub severity: Option<u8>,
    /// Free-text notes.
    pub notes: Option<String>,
}

impl From<Fields> for LogFields {
    fn from(fields: Fields) -> Self {
        LogFields {
            quantity: fields.quantity,
            unit: fields.unit,
            duration_minutes: fields.duration,
            severity: fields.severity,
            notes: fields.notes,
        }
    }
}

/// Runs the record command.
///
/// The entry is checked with the same rules the server applies, so that
/// an entry the server would reject never enters the journal.
pub fn run(
    path: &Path,
    owner: &str,
    category: Category,
    at: Option<DateTime<Utc>>,
    fields: Fields,
) -> Result<(), Box<dyn std::error::Error>> {
    let entry = build_entry(owner, category, at, fields)?;

    let store = JournalLogStore::open_path(path)?;
    store.insert(entry.clone())?;

    println!(
        "Recorded {} entry {} (key {})",
        entry.category, entry.id, entry.idempotency_key
    );
    println!("Pending uploads: {}", store.pending_count(&entry.owner_id)?);
    Ok(())
}

fn build_entry(
    owner: &str,
    category: Category,
    at: Option<DateTime<Utc>>,
    fields: Fields,
) -> Result<LogEntry, Box<dyn std::error::Error>> {
    let now = Utc::now();
    let entry = LogEntry::new(
        OwnerId::new(owner),
        category,
        at.unwrap_or(now),
        fields.into(),
    );
    validate_record(&entry.to_wire(), now)?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_land_in_the_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rex.journal");
        let fields = Fields {
            duration: Some(25),
            ..Fields::default()
        };
        run(&path, "rex", Category::Walk, None, fields).unwrap();

        let store = JournalLogStore::open_path(&path).unwrap();
        let pending = store.fetch_pending(&OwnerId::new("rex")).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fields.duration_minutes, Some(25));
    }

    #[test]
    fn invalid_entries_are_refused() {
        assert!(build_entry("rex", Category::Weight, None, Fields::default()).is_err());
        let fields = Fields {
            severity: Some(9),
            ..Fields::default()
        };
        assert!(build_entry("rex", Category::Symptom, None, fields).is_err());
    }
}
