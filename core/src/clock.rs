//! Planning clock: owns the horizon and the current year.
//!
//! Years are visited strictly in order. Each year's critic reads the
//! previous visited year's results, which need not be `year - 1` when
//! the horizon steps by more than one year.

use crate::{
    error::{PlanError, PlanResult},
    types::{RunId, Year},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanClock {
    pub run_id:  RunId,
    horizon:     Vec<Year>,
    /// Index into `horizon` of the next year to run.
    cursor:      usize,
}

impl PlanClock {
    /// `horizon` must be non-empty and strictly increasing.
    pub fn new(run_id: RunId, horizon: Vec<Year>) -> PlanResult<Self> {
        if horizon.is_empty() {
            return Err(PlanError::Other(anyhow::anyhow!("planning horizon is empty")));
        }
        if let Some(w) = horizon.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PlanError::Other(anyhow::anyhow!(
                "planning horizon not strictly increasing at {} -> {}",
                w[0],
                w[1]
            )));
        }
        Ok(Self { run_id, horizon, cursor: 0 })
    }

    /// The first (base) year of the run.
    pub fn base_year(&self) -> Year {
        self.horizon[0]
    }

    pub fn horizon(&self) -> &[Year] {
        &self.horizon
    }

    /// Most recently started year, if any.
    pub fn current_year(&self) -> Option<Year> {
        self.cursor.checked_sub(1).map(|i| self.horizon[i])
    }

    /// Year visited before `year`, if `year` is on the horizon and not the base year.
    pub fn previous_year(&self, year: Year) -> Option<Year> {
        let pos = self.horizon.iter().position(|&y| y == year)?;
        pos.checked_sub(1).map(|i| self.horizon[i])
    }

    /// The year the next advance() will return.
    pub fn next_year(&self) -> Option<Year> {
        self.horizon.get(self.cursor).copied()
    }

    /// Advance to the next year. Returns `None` once the horizon is exhausted.
    pub fn advance(&mut self) -> Option<Year> {
        let year = self.horizon.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(year)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.horizon.len()
    }
}
