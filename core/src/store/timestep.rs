use super::{PlanStore, TimestepRow};
use crate::{error::PlanResult, types::Year};
use rusqlite::params;

/// The two row-oriented time series tables exchanged with sector models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestepTable {
    Input,
    Output,
}

impl TimestepTable {
    fn table_name(self) -> &'static str {
        match self {
            Self::Input  => "input_timestep",
            Self::Output => "output_timestep",
        }
    }
}

impl PlanStore {
    // ── Time series ───────────────────────────────────────────────

    /// Replace every row for (parameter, year) with `rows` in one transaction.
    pub fn replace_timesteps(
        &self,
        table: TimestepTable,
        parameter: &str,
        year: Year,
        rows: &[TimestepRow],
    ) -> PlanResult<usize> {
        let name = table.table_name();
        let tx = self.conn.unchecked_transaction()?;
        let cleared = tx.execute(
            &format!("DELETE FROM {name} WHERE parameter = ?1 AND year = ?2"),
            params![parameter, year],
        )?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {name} (year, season, day, period, region_id, parameter, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))?;
            for r in rows {
                stmt.execute(params![
                    r.year, r.season, r.day, r.period, r.region_id, r.parameter, r.value
                ])?;
            }
        }
        tx.commit()?;
        if cleared > 0 {
            log::debug!("year={year} timesteps: replaced {cleared} {name} rows for '{parameter}'");
        }
        Ok(rows.len())
    }

    pub fn timesteps(
        &self,
        table: TimestepTable,
        parameter: &str,
        year: Year,
    ) -> PlanResult<Vec<TimestepRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT year, season, day, period, region_id, parameter, value
             FROM {} WHERE parameter = ?1 AND year = ?2
             ORDER BY region_id ASC, season ASC, day ASC, period ASC",
            table.table_name()
        ))?;
        let rows = stmt.query_map(params![parameter, year], |row| {
            Ok(TimestepRow {
                year:      row.get(0)?,
                season:    row.get(1)?,
                day:       row.get(2)?,
                period:    row.get(3)?,
                region_id: row.get(4)?,
                parameter: row.get(5)?,
                value:     row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn timestep_count(&self, table: TimestepTable, parameter: &str, year: Year) -> PlanResult<i64> {
        let count = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE parameter = ?1 AND year = ?2",
                table.table_name()
            ),
            params![parameter, year],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
