use super::PlanStore;
use crate::{error::PlanResult, types::Year};
use rusqlite::params;

impl PlanStore {
    // ── Model results ─────────────────────────────────────────────

    pub fn insert_model_result(
        &self,
        model: &str,
        output: &str,
        year: Year,
        iteration: u32,
        region: Option<&str>,
        value: f64,
    ) -> PlanResult<()> {
        self.conn.execute(
            "INSERT INTO model_result (model, output, year, iteration, region, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![model, output, year, iteration, region, value],
        )?;
        Ok(())
    }

    /// Sum of an output across regions. `None` when nothing was recorded.
    pub fn summed_model_result(
        &self,
        model: &str,
        output: &str,
        year: Year,
        iteration: u32,
    ) -> PlanResult<Option<f64>> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(value) FROM model_result
             WHERE model = ?1 AND output = ?2 AND year = ?3 AND iteration = ?4",
            params![model, output, year, iteration],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn clear_model_results(&self, model: &str, year: Year, iteration: u32) -> PlanResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM model_result WHERE model = ?1 AND year = ?2 AND iteration = ?3",
            params![model, year, iteration],
        )?;
        Ok(n)
    }
}
