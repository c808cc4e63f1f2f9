//! SQLite persistence layer.
//!
//! One connection behind a re-entrant lock. `atomic` holds the lock for the
//! whole unit and wraps it in `BEGIN IMMEDIATE`, so a unit sees no
//! interleaved writers from this process and takes the database write lock
//! up front against other processes sharing the file.

mod account;
mod investment;
mod transaction;

use super::{EventLog, LedgerStore};
use crate::{
    error::LedgerResult,
    event::{EventLogEntry, LedgerEvent},
    model::ParseEnumError,
    types::{from_millis, to_millis, Timestamp},
};
use parking_lot::ReentrantMutex;
use rusqlite::{params, types::Type, Connection, Row, TransactionBehavior};
use std::str::FromStr;
use std::time::Duration;

pub struct SqliteLedger {
    conn: ReentrantMutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: ReentrantMutex::new(conn),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: ReentrantMutex::new(conn),
        })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .lock()
            .execute_batch(include_str!("../../../../migrations/001_ledger.sql"))?;
        Ok(())
    }
}

impl LedgerStore for SqliteLedger {
    fn atomic<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce() -> LedgerResult<T>,
    {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            // Already inside a unit on this thread.
            return f();
        }
        let tx = rusqlite::Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        // Dropping `tx` on the error path rolls the unit back.
        let out = f()?;
        tx.commit()?;
        Ok(out)
    }
}

impl EventLog for SqliteLedger {
    fn append_event(&self, event: &LedgerEvent, recorded_at: Timestamp) -> LedgerResult<()> {
        let entry = EventLogEntry::new(event, recorded_at)?;
        self.conn.lock().execute(
            "INSERT INTO event_log (entity_id, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.entity_id,
                entry.event_type,
                entry.payload,
                to_millis(entry.recorded_at),
            ],
        )?;
        Ok(())
    }

    fn events_for(&self, entity_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, event_type, payload, recorded_at
             FROM event_log WHERE entity_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![entity_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    entity_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    recorded_at: timestamp(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Row decoding helpers ───────────────────────────────────────────

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = ParseEnumError>,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn parse_term(row: &Row<'_>, idx: usize) -> rusqlite::Result<crate::model::LockTerm> {
    let months: u32 = row.get(idx)?;
    crate::model::LockTerm::try_from(months)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn parse_opt_term(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<crate::model::LockTerm>> {
    match row.get::<_, Option<u32>>(idx)? {
        Some(_) => parse_term(row, idx).map(Some),
        None => Ok(None),
    }
}

fn millis_to_timestamp(idx: usize, ms: i64) -> rusqlite::Result<Timestamp> {
    from_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {ms}ms is out of range").into(),
        )
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    millis_to_timestamp(idx, row.get(idx)?)
}

fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|ms| millis_to_timestamp(idx, ms))
        .transpose()
}
