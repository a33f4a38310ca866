//! SQLite-backed record store.

use super::{ChangeSet, CommitClock, InsertOutcome, RecordStore, ServerRecord};
use crate::error::{ServerError, ServerResult};
use crate::principal::Principal;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pawlog_sync_protocol::{
    Category, IdempotencyKey, InsertedRecord, LogFields, OwnerId, RecordId, WireRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS owners (
    owner_id   TEXT PRIMARY KEY,
    principal  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    id               TEXT PRIMARY KEY,
    owner_id         TEXT NOT NULL,
    idempotency_key  TEXT NOT NULL,
    category         TEXT NOT NULL,
    fields           TEXT NOT NULL,
    timestamp_us     INTEGER NOT NULL,
    created_at_us    INTEGER NOT NULL,
    updated_at_us    INTEGER NOT NULL,
    deleted          INTEGER NOT NULL DEFAULT 0,
    UNIQUE (owner_id, idempotency_key)
);

CREATE INDEX IF NOT EXISTS idx_records_owner_updated ON records (owner_id, updated_at_us);
CREATE INDEX IF NOT EXISTS idx_records_owner_timestamp ON records (owner_id, timestamp_us);
";

const RECORD_COLUMNS: &str = "id, owner_id, idempotency_key, category, fields, \
     timestamp_us, created_at_us, updated_at_us, deleted";

/// Record store persisted in a SQLite database.
///
/// Timestamps are stored as microseconds since the Unix epoch so that
/// range queries compare numerically.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    /// Locked only while `conn` is held.
    clock: Mutex<CommitClock>,
}

impl SqliteRecordStore {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> ServerResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> ServerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ServerResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let latest: Option<i64> =
            conn.query_row("SELECT MAX(updated_at_us) FROM records", [], |row| row.get(0))?;
        let high_water = latest.map(from_micros).transpose()?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Mutex::new(CommitClock::starting_at(high_water)),
        })
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(us: i64) -> ServerResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| ServerError::Persistence(format!("timestamp out of range: {us}")))
}

type RawRecord = (String, String, String, String, String, i64, i64, i64, bool);

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_record(raw: RawRecord) -> ServerResult<ServerRecord> {
    let (id, owner_id, key, category, fields, timestamp, created_at, updated_at, deleted) = raw;
    let category: Category = category.parse().map_err(ServerError::Persistence)?;
    let fields: LogFields = serde_json::from_str(&fields)
        .map_err(|e| ServerError::Persistence(format!("corrupt fields for record {id}: {e}")))?;
    Ok(ServerRecord {
        id: RecordId::new(id),
        owner_id: OwnerId::new(owner_id),
        idempotency_key: IdempotencyKey::new(key),
        category,
        fields,
        timestamp: from_micros(timestamp)?,
        created_at: from_micros(created_at)?,
        updated_at: from_micros(updated_at)?,
        deleted,
    })
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<RawRecord>>,
) -> ServerResult<Vec<ServerRecord>> {
    rows.map(|row| decode_record(row?)).collect()
}

impl RecordStore for SqliteRecordStore {
    fn owner_principal(&self, owner: &OwnerId) -> ServerResult<Option<Principal>> {
        let conn = self.conn.lock();
        let principal: Option<String> = conn
            .query_row(
                "SELECT principal FROM owners WHERE owner_id = ?1",
                params![owner.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(principal.map(Principal::new))
    }

    fn register_owner(&self, owner: &OwnerId, principal: &Principal) -> ServerResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO owners (owner_id, principal) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET principal = excluded.principal",
            params![owner.as_str(), principal.as_str()],
        )?;
        Ok(())
    }

    fn existing_keys(
        &self,
        owner: &OwnerId,
        keys: &[IdempotencyKey],
    ) -> ServerResult<HashSet<IdempotencyKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM records WHERE owner_id = ?1 AND idempotency_key = ?2",
        )?;
        let mut existing = HashSet::new();
        for key in keys {
            if stmt.exists(params![owner.as_str(), key.as_str()])? {
                existing.insert(key.clone());
            }
        }
        Ok(existing)
    }

    fn insert_new(
        &self,
        owner: &OwnerId,
        records: &[WireRecord],
        now: DateTime<Utc>,
    ) -> ServerResult<InsertOutcome> {
        let mut conn = self.conn.lock();
        let stamp = self.clock.lock().stamp(now);
        let tx = conn.transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO records (id, owner_id, idempotency_key, category, fields,
                     timestamp_us, created_at_us, updated_at_us, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0)
                 ON CONFLICT(owner_id, idempotency_key) DO NOTHING",
            )?;
            for record in records {
                let id = RecordId::generate();
                let fields = serde_json::to_string(&record.fields)
                    .map_err(|e| ServerError::Internal(e.to_string()))?;
                let written = stmt.execute(params![
                    id.as_str(),
                    owner.as_str(),
                    record.idempotency_key.as_str(),
                    record.category.as_str(),
                    fields,
                    to_micros(record.timestamp),
                    to_micros(stamp),
                ])?;
                if written == 0 {
                    outcome.duplicates.push(record.idempotency_key.clone());
                } else {
                    outcome.inserted.push(InsertedRecord {
                        idempotency_key: record.idempotency_key.clone(),
                        id,
                    });
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn changes_since(
        &self,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ServerResult<ChangeSet> {
        let conn = self.conn.lock();
        let synced_at = self.clock.lock().stamp(now);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE owner_id = ?1 AND updated_at_us >= ?2
             ORDER BY updated_at_us DESC, rowid DESC"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let since = since.map_or(i64::MIN, to_micros);
        let rows = stmt.query_map(params![owner.as_str(), since], raw_record)?;
        let records = collect_records(rows)?;
        Ok(ChangeSet { records, synced_at })
    }

    fn recent_records(
        &self,
        owner: &OwnerId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> ServerResult<Vec<ServerRecord>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE owner_id = ?1 AND deleted = 0
               AND timestamp_us >= ?2 AND timestamp_us <= ?3
             ORDER BY timestamp_us DESC, rowid DESC
             LIMIT ?4"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![
                owner.as_str(),
                since.map_or(i64::MIN, to_micros),
                until.map_or(i64::MAX, to_micros),
                i64::try_from(limit).unwrap_or(i64::MAX),
            ],
            raw_record,
        )?;
        collect_records(rows)
    }

    fn soft_delete(
        &self,
        owner: &OwnerId,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> ServerResult<bool> {
        let conn = self.conn.lock();
        let exists = conn
            .prepare_cached("SELECT 1 FROM records WHERE owner_id = ?1 AND id = ?2")?
            .exists(params![owner.as_str(), id.as_str()])?;
        if exists {
            let stamp = self.clock.lock().stamp(now);
            conn.execute(
                "UPDATE records SET deleted = 1, updated_at_us = ?3
                 WHERE owner_id = ?1 AND id = ?2 AND deleted = 0",
                params![owner.as_str(), id.as_str(), to_micros(stamp)],
            )?;
        }
        Ok(exists)
    }
}
