//! Intervention registry: the durable catalogue of capital projects.
//!
//! Every ingested or built intervention gets:
//!   - one summary row in `interventions` (the master catalogue)
//!   - one row in `interventions_<sector>`, whose attribute columns are
//!     added on demand as new attribute names appear
//!
//! Per sector the state only moves forward: `{unseen} -> {table exists}`,
//! and columns are only ever added. Schema changes for one sector are
//! serialized through a [`SchemaRegistry`] lock, so two callers can never
//! both see a column missing and both try to add it.
//!
//! Batches (a whole initial-conditions file, or one year's decisions) run
//! inside a single `BEGIN IMMEDIATE` transaction, which keeps the id range
//! recorded for the batch's intervention set contiguous.
//!
//! LOCK ORDER: sector locks (sorted by sector name) before the database
//! write lock. Every path that holds both takes them in that order.

use crate::{
    error::{PlanError, PlanResult},
    store::{canonical_identifier, sector_table_name, PlanStore, SECTOR_TABLE_FIXED_COLUMNS},
    types::{InterventionId, Year},
};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

pub const INITIAL_CONDITIONS_SET: &str = "initial conditions";

/// An intervention as read from a source file or produced by a decision.
///
/// Anything that is not one of the named fields is an attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterventionRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub intervention_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_year: Option<Year>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl InterventionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sector: None,
            intervention_type: None,
            build_year: None,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// A persisted intervention.
#[derive(Debug, Clone, PartialEq)]
pub struct Intervention {
    pub id:     InterventionId,
    pub sector: String,
    pub record: InterventionRecord,
}

/// Outcome of one batch ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub ingested: Vec<InterventionId>,
    pub set_id:   Option<i64>,
    /// Records left unprocessed after a record-level failure.
    pub skipped:  usize,
    /// The record-level failure that stopped the batch, rendered for reporting.
    pub error:    Option<String>,
}

/// Per-sector locks guarding the check-then-alter schema sequence.
///
/// Clone it into every registry that writes the same database so all of
/// them serialize on the same locks.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    sectors: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sector_lock(&self, sector: &str) -> Arc<Mutex<()>> {
        let mut map = lock_ignoring_poison(&self.sectors);
        map.entry(sector.to_string()).or_default().clone()
    }
}

fn lock_ignoring_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_all(locks: &[Arc<Mutex<()>>]) -> Vec<MutexGuard<'_, ()>> {
    locks.iter().map(|l| lock_ignoring_poison(l)).collect()
}

pub struct InterventionRegistry {
    store:  PlanStore,
    schema: SchemaRegistry,
}

impl InterventionRegistry {
    pub fn new(store: PlanStore) -> Self {
        Self::with_schema(store, SchemaRegistry::new())
    }

    pub fn with_schema(store: PlanStore, schema: SchemaRegistry) -> Self {
        Self { store, schema }
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    // ── Sector reference table ────────────────────────────────────

    pub fn register_sector(&self, sector: &str) -> PlanResult<i64> {
        self.store.insert_sector(sector)
    }

    // ── Schema ────────────────────────────────────────────────────

    /// Create `interventions_<sector>` if absent. Returns true if it was created.
    pub fn ensure_sector_table(&self, sector: &str) -> PlanResult<bool> {
        let sector = canonical_identifier(sector)?;
        let lock = self.schema.sector_lock(&sector);
        let _guard = lock_ignoring_poison(&lock);
        self.create_table_if_absent(&sector)
    }

    /// Add a TEXT attribute column if no column of that name (any case) exists.
    /// Returns true if a column was added.
    pub fn ensure_column(&self, sector: &str, column: &str) -> PlanResult<bool> {
        let sector = canonical_identifier(sector)?;
        let lock = self.schema.sector_lock(&sector);
        let _guard = lock_ignoring_poison(&lock);
        self.add_column_if_absent(&sector, column)
    }

    /// Caller holds the sector lock.
    fn create_table_if_absent(&self, sector: &str) -> PlanResult<bool> {
        if self.store.table_exists(&sector_table_name(sector)?)? {
            return Ok(false);
        }
        self.store.create_sector_table(sector)?;
        log::info!("registry: created intervention table for sector '{sector}'");
        Ok(true)
    }

    /// Caller holds the sector lock.
    fn add_column_if_absent(&self, sector: &str, column: &str) -> PlanResult<bool> {
        let column = canonical_identifier(column)?;
        let table = sector_table_name(sector)?;
        if self.store.table_columns(&table)?.contains(&column) {
            return Ok(false);
        }
        self.store.add_text_column(&table, &column)?;
        log::debug!("registry: added column '{column}' to '{table}'");
        Ok(true)
    }

    /// Locks for every sector `records` write to, in lock order.
    /// Names that fail canonicalisation are left to add_intervention to reject.
    fn sector_locks(&self, records: &[InterventionRecord], sector: &str) -> Vec<Arc<Mutex<()>>> {
        let sectors: BTreeSet<String> = records
            .iter()
            .filter_map(|r| canonical_identifier(r.sector.as_deref().unwrap_or(sector)).ok())
            .collect();
        sectors.iter().map(|s| self.schema.sector_lock(s)).collect()
    }

    /// Attribute columns known for a sector (the fixed columns excluded).
    pub fn sector_columns(&self, sector: &str) -> PlanResult<Vec<String>> {
        let table = sector_table_name(sector)?;
        if !self.store.table_exists(&table)? {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .table_columns(&table)?
            .into_iter()
            .filter(|c| !SECTOR_TABLE_FIXED_COLUMNS.contains(&c.as_str()))
            .collect())
    }

    // ── Interventions ─────────────────────────────────────────────

    /// Persist one intervention. `sector` is used when the record names none.
    pub fn add_intervention(
        &self,
        record: &InterventionRecord,
        sector: &str,
    ) -> PlanResult<InterventionId> {
        let locks = self.sector_locks(std::slice::from_ref(record), sector);
        let _guards = lock_all(&locks);
        self.add_intervention_locked(record, sector)
    }

    /// Caller holds the lock for the record's sector.
    fn add_intervention_locked(
        &self,
        record: &InterventionRecord,
        sector: &str,
    ) -> PlanResult<InterventionId> {
        let sector_name = record.sector.as_deref().unwrap_or(sector);
        let unknown = || PlanError::UnknownSector {
            sector:       sector_name.to_string(),
            intervention: record.name.clone(),
        };
        let sector_name = canonical_identifier(sector_name).map_err(|_| unknown())?;
        let sector_id = self.store.sector_id(&sector_name)?.ok_or_else(unknown)?;

        if self
            .store
            .sector_built_names(&sector_name, None)?
            .iter()
            .any(|n| n == &record.name)
        {
            return Err(PlanError::DuplicateIntervention {
                sector: sector_name,
                name:   record.name.clone(),
            });
        }

        // Stage attribute values before writing anything, so a bad
        // attribute name fails the record without leaving a summary row.
        let mut staged: Vec<(String, SqlValue)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (key, value) in flatten_attributes(&record.attributes) {
            let column = canonical_identifier(&key)?;
            if !seen.insert(column.clone()) {
                log::warn!(
                    "registry: attribute '{key}' of '{}' repeats column '{column}'",
                    record.name
                );
                return Err(PlanError::InvalidIdentifier(key));
            }
            if SECTOR_TABLE_FIXED_COLUMNS.contains(&column.as_str()) {
                log::warn!(
                    "registry: attribute '{key}' of '{}' shadows a fixed column; kept in details only",
                    record.name
                );
                continue;
            }
            if let Some(v) = stage_value(&value) {
                staged.push((column, v));
            }
        }

        let details = serde_json::to_string(record)?;
        let id = self
            .store
            .insert_intervention_summary(&sector_name, &record.name, &details)?;

        self.create_table_if_absent(&sector_name)?;
        for (column, _) in &staged {
            self.add_column_if_absent(&sector_name, column)?;
        }

        self.store.insert_sector_row(
            &sector_name,
            id,
            sector_id,
            &record.name,
            record.intervention_type.as_deref(),
            record.build_year,
            &details,
            &staged,
        )?;
        Ok(id)
    }

    /// Record a named batch. Members are kept in the order given.
    pub fn create_set(
        &self,
        name: &str,
        sector: &str,
        description: &str,
        member_ids: &[InterventionId],
    ) -> PlanResult<i64> {
        self.store
            .insert_intervention_set(name, sector, description, member_ids)
    }

    /// Ingest `records` as one batch and group them under a new set.
    ///
    /// A record-level failure (unknown sector, unusable attribute name,
    /// duplicate name) stops the batch: records before it are kept and
    /// grouped, the rest are skipped and counted in the report. Any other
    /// error rolls the whole batch back.
    pub fn ingest_batch(
        &self,
        records: &[InterventionRecord],
        sector: &str,
        set_name: &str,
        description: &str,
    ) -> PlanResult<BatchReport> {
        let sector = canonical_identifier(sector)?;
        let sector = sector.as_str();
        let locks = self.sector_locks(records, sector);
        let _guards = lock_all(&locks);
        let tx = self.store.begin_immediate()?;

        let first_id = self.store.max_intervention_id()? + 1;
        let mut report = BatchReport::default();
        for (i, record) in records.iter().enumerate() {
            match self.add_intervention_locked(record, sector) {
                Ok(id) => report.ingested.push(id),
                Err(e) if e.is_record_error() => {
                    report.skipped = records.len() - i;
                    report.error = Some(e.to_string());
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        let last_id = self.store.max_intervention_id()?;

        if last_id >= first_id {
            let members: Vec<InterventionId> = (first_id..=last_id).collect();
            report.set_id = Some(self.create_set(set_name, sector, description, &members)?);
        }
        tx.commit()?;
        Ok(report)
    }

    /// Import a JSON array of intervention records as an "initial conditions" set.
    ///
    /// A record-level failure is logged with the file name and the rest of
    /// the file is skipped; the caller carries on with the next file.
    pub fn import_file(&self, path: &Path, sector: &str) -> PlanResult<BatchReport> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<InterventionRecord> = serde_json::from_str(&content)?;
        let description = format!("Existing interventions from {}", path.display());

        let report = self.ingest_batch(&records, sector, INITIAL_CONDITIONS_SET, &description)?;
        match &report.error {
            Some(e) => log::warn!(
                "registry: {} sector '{sector}': {e}; skipped {} remaining record(s)",
                path.display(),
                report.skipped
            ),
            None => log::info!(
                "registry: imported {} intervention(s) for sector '{sector}' from {}",
                report.ingested.len(),
                path.display()
            ),
        }
        Ok(report)
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn get_intervention(&self, id: InterventionId) -> PlanResult<Option<Intervention>> {
        let Some(row) = self.store.intervention(id)? else {
            return Ok(None);
        };
        Ok(Some(Intervention {
            id:     row.id,
            sector: row.sector,
            record: serde_json::from_str(&row.details)?,
        }))
    }

    pub fn intervention_count(&self, sector: &str) -> PlanResult<i64> {
        self.store.intervention_count(&canonical_identifier(sector)?)
    }

    /// Names present in the sector's table, in id order.
    pub fn built_names(&self, sector: &str) -> PlanResult<Vec<String>> {
        self.store.sector_built_names(sector, None)
    }

    pub fn built_in_year(&self, sector: &str, year: Year) -> PlanResult<Vec<String>> {
        self.store.sector_built_names(sector, Some(year))
    }

    pub fn sets(&self, sector: &str) -> PlanResult<Vec<crate::store::InterventionSetRow>> {
        self.store.intervention_sets(&canonical_identifier(sector)?)
    }
}

/// Flatten one level of nesting: `{"a": {"b": 1}}` becomes `a_b = 1`.
/// Keys keep their source order.
pub fn flatten_attributes(attributes: &Map<String, Value>) -> Vec<(String, Value)> {
    let mut flat = Vec::with_capacity(attributes.len());
    for (key, value) in attributes {
        match value {
            Value::Object(inner) => {
                for (sub, v) in inner {
                    flat.push((format!("{key}_{sub}"), v.clone()));
                }
            }
            v => flat.push((key.clone(), v.clone())),
        }
    }
    flat
}

/// SQL value for an attribute. `None` for null, which is never stored.
/// Lists and deeper maps are stored as JSON text.
pub fn stage_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Some(SqlValue::Text(value.to_string())),
    }
}
