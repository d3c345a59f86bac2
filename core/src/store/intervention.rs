use super::{
    canonical_identifier, quote_ident, sector_table_name, InterventionRow, InterventionSetRow,
    PlanStore,
};
use crate::{
    error::PlanResult,
    types::{InterventionId, Year},
};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};

/// Fixed columns of every `interventions_<sector>` table.
pub const SECTOR_TABLE_FIXED_COLUMNS: [&str; 6] =
    ["id", "sector_id", "name", "type", "build_year", "details"];

impl PlanStore {
    // ── Master catalogue ──────────────────────────────────────────

    pub fn insert_intervention_summary(
        &self,
        sector: &str,
        name: &str,
        details: &str,
    ) -> PlanResult<InterventionId> {
        self.conn.execute(
            "INSERT INTO interventions (sector, name, details) VALUES (?1, ?2, ?3)",
            params![sector, name, details],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Highest id in the master catalogue, 0 when empty.
    pub fn max_intervention_id(&self) -> PlanResult<InterventionId> {
        let id: Option<i64> = self.conn.query_row(
            "SELECT MAX(id) FROM interventions",
            [],
            |row| row.get(0),
        )?;
        Ok(id.unwrap_or(0))
    }

    pub fn intervention(&self, id: InterventionId) -> PlanResult<Option<InterventionRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, sector, name, details FROM interventions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(InterventionRow {
                        id:      row.get(0)?,
                        sector:  row.get(1)?,
                        name:    row.get(2)?,
                        details: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn intervention_count(&self, sector: &str) -> PlanResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM interventions WHERE sector = ?1",
            params![sector],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn intervention_names(&self, sector: &str) -> PlanResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT name FROM interventions WHERE sector = ?1 ORDER BY name ASC",
        )?;
        let rows = stmt.query_map(params![sector], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Per-sector detail tables ──────────────────────────────────

    pub fn table_exists(&self, table: &str) -> PlanResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn create_sector_table(&self, sector: &str) -> PlanResult<()> {
        let table = quote_ident(&sector_table_name(sector)?);
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id          INTEGER PRIMARY KEY,
                sector_id   INTEGER NOT NULL REFERENCES sector(id),
                name        TEXT NOT NULL,
                type        TEXT,
                build_year  INTEGER,
                details     TEXT NOT NULL
            );"
        ))?;
        Ok(())
    }

    /// Column names of `table`, in declaration order, lower-cased.
    pub fn table_columns(&self, table: &str) -> PlanResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let columns = rows
            .map(|r| r.map(|c| c.to_ascii_lowercase()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Unconditional `ALTER TABLE .. ADD COLUMN`; callers check for presence first.
    pub fn add_text_column(&self, table: &str, column: &str) -> PlanResult<()> {
        let column = canonical_identifier(column)?;
        self.conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT;",
            quote_ident(table),
            quote_ident(&column)
        ))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_sector_row(
        &self,
        sector: &str,
        id: InterventionId,
        sector_id: i64,
        name: &str,
        intervention_type: Option<&str>,
        build_year: Option<Year>,
        details: &str,
        attributes: &[(String, Value)],
    ) -> PlanResult<()> {
        let table = quote_ident(&sector_table_name(sector)?);

        let mut columns: Vec<String> = SECTOR_TABLE_FIXED_COLUMNS
            .iter()
            .map(|c| quote_ident(c))
            .collect();
        let mut values: Vec<Value> = vec![
            Value::Integer(id),
            Value::Integer(sector_id),
            Value::Text(name.to_string()),
            intervention_type.map_or(Value::Null, |t| Value::Text(t.to_string())),
            build_year.map_or(Value::Null, Value::Integer),
            Value::Text(details.to_string()),
        ];
        for (column, value) in attributes {
            columns.push(quote_ident(&canonical_identifier(column)?));
            values.push(value.clone());
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Names built in a sector, optionally limited to one build year.
    /// Returns an empty list when the sector table does not exist yet.
    pub fn sector_built_names(&self, sector: &str, year: Option<Year>) -> PlanResult<Vec<String>> {
        let table_name = sector_table_name(sector)?;
        if !self.table_exists(&table_name)? {
            return Ok(Vec::new());
        }
        let table = quote_ident(&table_name);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name FROM {table}
             WHERE (?1 IS NULL OR build_year = ?1)
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![year], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// A single dynamic attribute value from a sector table, as stored.
    pub fn sector_attribute(
        &self,
        sector: &str,
        id: InterventionId,
        column: &str,
    ) -> PlanResult<Option<Value>> {
        let table = quote_ident(&sector_table_name(sector)?);
        let column = quote_ident(&canonical_identifier(column)?);
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {column} FROM {table} WHERE id = ?1"),
                params![id],
                |row| row.get::<_, Value>(0),
            )
            .optional()?)
    }

    // ── Intervention sets ─────────────────────────────────────────

    pub fn insert_intervention_set(
        &self,
        name: &str,
        sector: &str,
        description: &str,
        members: &[InterventionId],
    ) -> PlanResult<i64> {
        let members_json = serde_json::to_string(members)?;
        self.conn.execute(
            "INSERT INTO intervention_sets (interventions, sector, name, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![members_json, sector, name, description],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn intervention_sets(&self, sector: &str) -> PlanResult<Vec<InterventionSetRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, interventions, sector, name, description
             FROM intervention_sets WHERE sector = ?1 ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map(params![sector], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, members, sector, name, description)| {
                Ok(InterventionSetRow {
                    id,
                    interventions: serde_json::from_str(&members)?,
                    sector,
                    name,
                    description,
                })
            })
            .collect()
    }
}
