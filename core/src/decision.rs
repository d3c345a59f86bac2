//! Decision modules: the critic/actor pair run once per simulated year.
//!
//! RULE: Every decision module implements DecisionModule.
//! The engine calls get_decision() on each registered module in
//! registration order, once per year. Modules never write to the
//! registry themselves; the engine persists what they return.
//!
//!   Critic: ceiling budget minus the previous year's simulated costs.
//!   Actor:  greedy pick of the cheapest candidates that still fit.

use crate::{
    error::PlanResult,
    registry::InterventionRecord,
    store::PlanStore,
    types::Year,
};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Attribute read as the capital cost of a candidate.
pub const CAPITAL_COST_ATTRIBUTE: &str = "capital_cost";

/// One build decision for one year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub name:       String,
    pub build_year: Year,
}

/// Budget available to the actor in one year. `f64::INFINITY` means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetState {
    pub year:             Year,
    pub remaining_budget: f64,
    pub previous_cost:    Option<f64>,
}

/// Read access to the orchestrator's results store.
pub trait ResultsSource {
    /// Sum of `output` across regions for (model, year, iteration).
    /// `None` when the model recorded nothing for that key.
    fn summed_output(
        &self,
        model: &str,
        output: &str,
        year: Year,
        iteration: u32,
    ) -> PlanResult<Option<f64>>;
}

impl ResultsSource for PlanStore {
    fn summed_output(
        &self,
        model: &str,
        output: &str,
        year: Year,
        iteration: u32,
    ) -> PlanResult<Option<f64>> {
        self.summed_model_result(model, output, year, iteration)
    }
}

/// Everything a module sees for one year.
pub struct DecisionState<'a> {
    pub year:          Year,
    pub base_year:     Year,
    /// The horizon year visited before `year`; `None` in the base year.
    pub previous_year: Option<Year>,
    pub iteration:     u32,
    /// Candidates not yet built in the module's sector, in register order.
    pub candidates:    &'a [InterventionRecord],
    pub results:       &'a dyn ResultsSource,
}

/// The contract every decision module must fulfill.
pub trait DecisionModule: Send {
    /// Stable name used in logs and the event log.
    fn name(&self) -> &str;

    /// Sector whose candidates this module builds.
    fn sector(&self) -> &str;

    /// Run critic then actor for `state.year`.
    fn get_decision(&mut self, state: &DecisionState<'_>) -> PlanResult<Vec<DecisionRecord>>;

    /// Budget computed by the most recent get_decision() call.
    fn last_budget(&self) -> Option<BudgetState>;

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;
}

// ── Critic ────────────────────────────────────────────────────────

/// One simulated result subtracted from the ceiling, scaled by `weight`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostTerm {
    pub model:  String,
    pub output: String,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

fn unit_weight() -> f64 {
    1.0
}

impl CostTerm {
    pub fn new(model: &str, output: &str, weight: f64) -> Self {
        Self {
            model:  model.to_string(),
            output: output.to_string(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCritic {
    /// Fixed for the run. `f64::INFINITY` for no ceiling.
    pub ceiling: f64,
    pub terms:   Vec<CostTerm>,
}

impl BudgetCritic {
    pub fn new(ceiling: f64, terms: Vec<CostTerm>) -> Self {
        Self { ceiling, terms }
    }

    pub fn evaluate(&self, state: &DecisionState<'_>) -> PlanResult<BudgetState> {
        let year = state.year;
        let previous = match state.previous_year {
            Some(p) if year != state.base_year => p,
            _ => {
                return Ok(BudgetState {
                    year,
                    remaining_budget: self.ceiling,
                    previous_cost: None,
                })
            }
        };

        let mut previous_cost: Option<f64> = None;
        for term in &self.terms {
            match state
                .results
                .summed_output(&term.model, &term.output, previous, state.iteration)?
            {
                Some(v) => *previous_cost.get_or_insert(0.0) += term.weight * v,
                None => log::warn!(
                    "year={year} critic: no '{}.{}' result for {previous}; counted as zero",
                    term.model,
                    term.output
                ),
            }
        }

        let remaining_budget = (self.ceiling - previous_cost.unwrap_or(0.0)).max(0.0);
        Ok(BudgetState {
            year,
            remaining_budget,
            previous_cost,
        })
    }
}

// ── Actor ─────────────────────────────────────────────────────────

/// Capital cost of a candidate, or `+inf` when absent or not numeric.
///
/// Accepts a bare number, a numeric string, or a `{"value": ..}` map.
pub fn capital_cost(record: &InterventionRecord) -> f64 {
    fn numeric(v: &serde_json::Value) -> Option<f64> {
        match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            serde_json::Value::Object(m) => m.get("value").and_then(numeric),
            _ => None,
        }
    }
    record
        .attributes
        .get(CAPITAL_COST_ATTRIBUTE)
        .and_then(numeric)
        .filter(|c| !c.is_nan())
        .unwrap_or(f64::INFINITY)
}

/// Greedy selection within `budget`.
///
/// Candidates are stable-sorted by ascending cost, then accepted while the
/// cost fits what is left. No backtracking: a skipped candidate stays skipped.
pub fn greedy_select(candidates: &[(String, f64)], budget: f64, year: Year) -> Vec<DecisionRecord> {
    let mut sorted: Vec<&(String, f64)> = candidates.iter().collect();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut remaining = budget;
    let mut decisions = Vec::new();
    for (name, cost) in sorted {
        if *cost <= remaining {
            decisions.push(DecisionRecord {
                name:       name.clone(),
                build_year: year,
            });
            // An unlimited budget stays unlimited (inf - inf would be NaN).
            if remaining.is_finite() {
                remaining -= cost;
            }
        }
    }
    decisions
}

// ── Domain modules ────────────────────────────────────────────────

/// Which domain a module plans for. Each domain fixes the results its
/// critic charges against the ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum DecisionModuleConfig {
    /// Charges last year's operating cost and priced emissions.
    Energy {
        sector: String,
        #[serde(default = "default_energy_model")]
        model: String,
        #[serde(default)]
        carbon_price: f64,
    },
    /// Charges last year's network operating cost.
    Digital {
        sector: String,
        #[serde(default = "default_digital_model")]
        model: String,
    },
    /// Charges whatever results are listed.
    GenericBudget {
        sector: String,
        #[serde(default)]
        terms: Vec<CostTerm>,
    },
}

fn default_energy_model() -> String {
    "energy_supply".into()
}

fn default_digital_model() -> String {
    "digital_comms".into()
}

impl DecisionModuleConfig {
    pub fn sector(&self) -> &str {
        match self {
            Self::Energy { sector, .. }
            | Self::Digital { sector, .. }
            | Self::GenericBudget { sector, .. } => sector,
        }
    }

    /// Build the module with the run's budget ceiling.
    pub fn build(&self, ceiling: f64) -> Box<dyn DecisionModule> {
        let (name, terms) = match self {
            Self::Energy { model, carbon_price, .. } => {
                let mut terms = vec![CostTerm::new(model, "total_opex", 1.0)];
                if *carbon_price != 0.0 {
                    terms.push(CostTerm::new(model, "total_emissions", *carbon_price));
                }
                ("energy", terms)
            }
            Self::Digital { model, .. } => {
                ("digital", vec![CostTerm::new(model, "total_opex", 1.0)])
            }
            Self::GenericBudget { terms, .. } => ("generic_budget", terms.clone()),
        };
        Box::new(BudgetDecisionModule::new(
            format!("{name}:{}", self.sector()),
            self.sector(),
            BudgetCritic::new(ceiling, terms),
        ))
    }
}

/// Critic + greedy actor over one sector's candidates.
pub struct BudgetDecisionModule {
    name:        String,
    sector:      String,
    critic:      BudgetCritic,
    last_budget: Option<BudgetState>,
}

impl BudgetDecisionModule {
    pub fn new(name: impl Into<String>, sector: &str, critic: BudgetCritic) -> Self {
        Self {
            name: name.into(),
            sector: sector.to_string(),
            critic,
            last_budget: None,
        }
    }

    pub fn critic(&self) -> &BudgetCritic {
        &self.critic
    }
}

impl DecisionModule for BudgetDecisionModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn sector(&self) -> &str {
        &self.sector
    }

    fn get_decision(&mut self, state: &DecisionState<'_>) -> PlanResult<Vec<DecisionRecord>> {
        let budget = self.critic.evaluate(state)?;
        self.last_budget = Some(budget);

        let priced: Vec<(String, f64)> = state
            .candidates
            .iter()
            .map(|c| (c.name.clone(), capital_cost(c)))
            .collect();
        let decisions = greedy_select(&priced, budget.remaining_budget, state.year);

        log::info!(
            "year={} {}: budget={:.2} candidates={} decisions={}",
            state.year,
            self.name,
            budget.remaining_budget,
            priced.len(),
            decisions.len()
        );
        Ok(decisions)
    }

    fn last_budget(&self) -> Option<BudgetState> {
        self.last_budget
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
