//! Plan events: the per-year audit trail of the decision loop.
//!
//! Every budget computation and every build decision is recorded here
//! and persisted to `event_log`, so a run can be audited year by year.

use crate::types::{InterventionId, RunId, Year};
use serde::{Deserialize, Serialize};

/// Every event emitted during a planning run.
/// Variants are appended only. Never remove or reorder them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id: RunId,
        base_year: Year,
    },
    YearStarted {
        year: Year,
    },
    YearCompleted {
        year: Year,
        decisions: usize,
    },

    // ── Critic / actor events ──────────────────────
    BudgetComputed {
        year: Year,
        module: String,
        /// `None` encodes an unlimited budget (JSON has no infinity).
        remaining_budget: Option<f64>,
        previous_cost: Option<f64>,
    },
    InterventionBuilt {
        year: Year,
        module: String,
        sector: String,
        name: String,
        intervention_id: InterventionId,
        capital_cost: Option<f64>,
    },

    // ── Collaborator events ────────────────────────
    SectorModelsRun {
        year: Year,
    },
}

impl PlanEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            PlanEvent::RunInitialized { .. }    => "run_initialized",
            PlanEvent::YearStarted { .. }       => "year_started",
            PlanEvent::YearCompleted { .. }     => "year_completed",
            PlanEvent::BudgetComputed { .. }    => "budget_computed",
            PlanEvent::InterventionBuilt { .. } => "intervention_built",
            PlanEvent::SectorModelsRun { .. }   => "sector_models_run",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub year: Year,
    pub component: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized PlanEvent
}
