//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Registry, gateway and engine call store methods; they never execute SQL directly.

use crate::{
    error::{PlanError, PlanResult},
    event::EventLogEntry,
    types::{InterventionId, Year},
};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

mod intervention;
mod results;
mod timestep;

pub use intervention::SECTOR_TABLE_FIXED_COLUMNS;
pub use timestep::TimestepTable;

pub struct PlanStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PlanStore {
    pub fn open(path: &str) -> PlanResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PlanResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> PlanResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PlanResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    /// Start a write transaction that takes the database write lock up front.
    /// Used for batches whose id-range reads must not interleave with other writers.
    pub(crate) fn begin_immediate(&self) -> PlanResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, base_year: Year, version: &str) -> PlanResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, base_year, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, base_year, version, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn run_exists(&self, run_id: &str) -> PlanResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM run WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> PlanResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, year, component, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.year,
                entry.component,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_year(&self, run_id: &str, year: Year) -> PlanResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, year, component, event_type, payload
             FROM event_log WHERE run_id = ?1 AND year = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, year], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    year:       row.get(2)?,
                    component:  row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Sector reference table ─────────────────────────────────

    /// Register a sector name. Returns its id; existing names keep their id.
    pub fn insert_sector(&self, name: &str) -> PlanResult<i64> {
        let name = canonical_identifier(name)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO sector (name) VALUES (?1)",
            params![name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM sector WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn sector_id(&self, name: &str) -> PlanResult<Option<i64>> {
        let Ok(name) = canonical_identifier(name) else {
            return Ok(None);
        };
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM sector WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn sectors(&self) -> PlanResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM sector ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

/// Lower-case a sector or attribute name into a form usable as an SQL identifier.
///
/// Spaces, dashes and dots fold to `_`. Anything else outside `[a-z0-9_]`
/// is rejected rather than escaped.
pub fn canonical_identifier(raw: &str) -> PlanResult<String> {
    let canonical: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    let valid = !canonical.is_empty()
        && canonical
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(canonical)
    } else {
        Err(PlanError::InvalidIdentifier(raw.to_string()))
    }
}

/// Name of the per-sector detail table.
pub fn sector_table_name(sector: &str) -> PlanResult<String> {
    Ok(format!("interventions_{}", canonical_identifier(sector)?))
}

/// Quote an identifier that has already passed [`canonical_identifier`].
fn quote_ident(ident: &str) -> String {
    format!("\"{ident}\"")
}

// ── Row types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct InterventionRow {
    pub id:      InterventionId,
    pub sector:  String,
    pub name:    String,
    pub details: String, // JSON-serialized attribute map
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterventionSetRow {
    pub id:            i64,
    pub interventions: Vec<InterventionId>,
    pub sector:        String,
    pub name:          String,
    pub description:   String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestepRow {
    pub year:      Year,
    pub season:    u32,
    pub day:       u32,
    pub period:    u32,
    pub region_id: i64,
    pub parameter: String,
    pub value:     f64,
}
