//! The planning engine: drives the critic/actor loop year by year.
//!
//! PER-YEAR ORDER (fixed, never reordered):
//!   1. Each decision module, in registration order:
//!        critic -> actor -> persist accepted decisions as one batch
//!   2. Sector models run for the year (external collaborator)
//!   3. Year completed; the next year's critics read step 2's results
//!
//! RULES:
//!   - Years run strictly in sequence; there is no parallelism across years.
//!   - Modules see only candidates not yet built in their sector.
//!   - Every budget and every build is recorded in the event log.
//!   - Cancellation is honoured between years only.

use crate::{
    clock::PlanClock,
    config::PlanConfig,
    decision::{
        capital_cost, BudgetState, DecisionModule, DecisionRecord, DecisionState,
    },
    error::{PlanError, PlanResult},
    event::{EventLogEntry, PlanEvent},
    registry::{BatchReport, InterventionRecord, InterventionRegistry},
    store::PlanStore,
    types::{RunId, Year},
};
use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

/// The external model-execution step run after each year's decisions.
pub trait SectorModelRunner {
    /// Run every sector model for `year` and record their outputs in `store`.
    fn run_year(
        &mut self,
        year: Year,
        decisions: &[DecisionRecord],
        store: &PlanStore,
    ) -> PlanResult<()>;
}

/// Runs nothing. Critics then see no results and keep the full ceiling.
pub struct NullModelRunner;

impl SectorModelRunner for NullModelRunner {
    fn run_year(&mut self, _: Year, _: &[DecisionRecord], _: &PlanStore) -> PlanResult<()> {
        Ok(())
    }
}

/// What one year produced.
#[derive(Debug, Clone, PartialEq)]
pub struct YearOutcome {
    pub year:      Year,
    pub budgets:   Vec<(String, BudgetState)>,
    pub decisions: Vec<DecisionRecord>,
}

pub struct PlanEngine {
    pub run_id:   RunId,
    pub clock:    PlanClock,
    pub registry: InterventionRegistry,
    iteration:    u32,
    modules:      Vec<Box<dyn DecisionModule>>,
    candidates:   BTreeMap<String, Vec<InterventionRecord>>,
    runner:       Box<dyn SectorModelRunner>,
}

impl PlanEngine {
    pub fn new(
        run_id: RunId,
        horizon: Vec<Year>,
        registry: InterventionRegistry,
    ) -> PlanResult<Self> {
        Ok(Self {
            clock: PlanClock::new(run_id.clone(), horizon)?,
            registry,
            iteration: 0,
            modules: Vec::new(),
            candidates: BTreeMap::new(),
            runner: Box::new(NullModelRunner),
            run_id,
        })
    }

    /// Build a fully wired engine from config: sectors registered,
    /// modules built, candidates loaded. Initial conditions are not imported.
    pub fn build(run_id: RunId, config: &PlanConfig, store: PlanStore) -> PlanResult<Self> {
        let registry = InterventionRegistry::new(store);
        for sector in &config.run.sectors {
            registry.register_sector(sector)?;
        }

        let mut engine = PlanEngine::new(run_id, config.run.horizon.clone(), registry)?;
        engine.iteration = config.run.iteration;
        for module in &config.run.decision_modules {
            engine.register(module.build(config.run.ceiling()));
        }
        for (sector, records) in &config.candidates {
            engine.set_candidates(sector, records.clone());
        }
        Ok(engine)
    }

    /// In-memory engine on PlanConfig::default_test(), run row inserted.
    pub fn build_test(run_id: RunId) -> PlanResult<Self> {
        let store = PlanStore::in_memory()?;
        store.migrate()?;
        let config = PlanConfig::default_test();
        let engine = Self::build(run_id, &config, store)?;
        engine
            .registry
            .store()
            .insert_run(&engine.run_id, engine.clock.base_year(), "0.1.0-test")?;
        Ok(engine)
    }

    /// Register a decision module. Modules run in registration order.
    pub fn register(&mut self, module: Box<dyn DecisionModule>) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[Box<dyn DecisionModule>] {
        &self.modules
    }

    pub fn set_candidates(&mut self, sector: &str, records: Vec<InterventionRecord>) {
        self.candidates.insert(sector.to_string(), records);
    }

    pub fn set_model_runner(&mut self, runner: Box<dyn SectorModelRunner>) {
        self.runner = runner;
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Import each (sector, file) pair as an initial-conditions set.
    /// A failing file is reported and skipped; the rest still import.
    pub fn import_initial_conditions(
        &self,
        files: &[(String, std::path::PathBuf)],
    ) -> PlanResult<Vec<BatchReport>> {
        let mut reports = Vec::with_capacity(files.len());
        for (sector, path) in files {
            match self.registry.import_file(path, sector) {
                Ok(report) => reports.push(report),
                Err(e) if e.is_record_error() => {
                    log::warn!("registry: skipping {}: {e}", path.display());
                    reports.push(BatchReport {
                        error: Some(e.to_string()),
                        ..BatchReport::default()
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    /// Run the next year on the horizon. `None` once the horizon is done.
    pub fn step(&mut self) -> PlanResult<Option<YearOutcome>> {
        let Some(year) = self.clock.advance() else {
            return Ok(None);
        };
        if year == self.clock.base_year() {
            self.record("engine", year, &PlanEvent::RunInitialized {
                run_id:    self.run_id.clone(),
                base_year: year,
            })?;
        }
        self.record("engine", year, &PlanEvent::YearStarted { year })?;

        let previous_year = self.clock.previous_year(year);
        let mut outcome = YearOutcome {
            year,
            budgets: Vec::new(),
            decisions: Vec::new(),
        };

        for idx in 0..self.modules.len() {
            let sector = self.modules[idx].sector().to_string();
            let built: HashSet<String> = self.registry.built_names(&sector)?.into_iter().collect();
            let open: Vec<InterventionRecord> = self
                .candidates
                .get(&sector)
                .map(|all| {
                    all.iter()
                        .filter(|c| !built.contains(&c.name))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let state = DecisionState {
                year,
                base_year: self.clock.base_year(),
                previous_year,
                iteration: self.iteration,
                candidates: &open,
                results: self.registry.store(),
            };
            let decisions = self.modules[idx].get_decision(&state)?;
            let module_name = self.modules[idx].name().to_string();

            if let Some(budget) = self.modules[idx].last_budget() {
                self.record(&module_name, year, &PlanEvent::BudgetComputed {
                    year,
                    module: module_name.clone(),
                    remaining_budget: budget.remaining_budget.is_finite().then_some(budget.remaining_budget),
                    previous_cost: budget.previous_cost,
                })?;
                outcome.budgets.push((module_name.clone(), budget));
            }

            let recorded = self.persist_decisions(&module_name, &sector, year, &open, decisions)?;
            outcome.decisions.extend(recorded);
        }

        self.runner
            .run_year(year, &outcome.decisions, self.registry.store())?;
        self.record("engine", year, &PlanEvent::SectorModelsRun { year })?;

        self.record("engine", year, &PlanEvent::YearCompleted {
            year,
            decisions: outcome.decisions.len(),
        })?;
        Ok(Some(outcome))
    }

    /// Run every remaining year. `cancel` is checked before each year.
    pub fn run(&mut self, cancel: &AtomicBool) -> PlanResult<Vec<YearOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(next) = self.clock.next_year() {
            if cancel.load(Ordering::SeqCst) {
                log::warn!("engine: run {} cancelled before year {next}", self.run_id);
                return Err(PlanError::Cancelled { year: next });
            }
            if let Some(outcome) = self.step()? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    pub fn run_all(&mut self) -> PlanResult<Vec<YearOutcome>> {
        self.run(&AtomicBool::new(false))
    }

    /// Query events for a specific year from the store.
    pub fn events_for_year(&self, year: Year) -> PlanResult<Vec<EventLogEntry>> {
        self.registry.store().events_for_year(&self.run_id, year)
    }

    /// Ingest a module's decisions. Returns only the decisions that made it
    /// into the registry, in decision order.
    fn persist_decisions(
        &self,
        module: &str,
        sector: &str,
        year: Year,
        candidates: &[InterventionRecord],
        decisions: Vec<DecisionRecord>,
    ) -> PlanResult<Vec<DecisionRecord>> {
        if decisions.is_empty() {
            return Ok(decisions);
        }
        let mut accepted = Vec::with_capacity(decisions.len());
        let mut records = Vec::with_capacity(decisions.len());
        for d in decisions {
            let Some(candidate) = candidates.iter().find(|c| c.name == d.name) else {
                log::warn!("year={year} {module}: decision '{}' names no open candidate; dropped", d.name);
                continue;
            };
            let mut built = candidate.clone();
            built.build_year = Some(d.build_year);
            built.sector = Some(sector.to_string());
            records.push(built);
            accepted.push(d);
        }

        let report = self.registry.ingest_batch(
            &records,
            sector,
            &format!("{module} {year}"),
            &format!("Interventions built by {module} in {year}"),
        )?;
        if let Some(e) = &report.error {
            log::warn!("year={year} {module}: {e}; {} decision(s) not recorded", report.skipped);
        }

        // A batch stops at its first failing record, so the ingested ids
        // line up with a prefix of `records`.
        accepted.truncate(report.ingested.len());
        for (record, id) in records.iter().zip(&report.ingested) {
            let cost = capital_cost(record);
            self.record(module, year, &PlanEvent::InterventionBuilt {
                year,
                module: module.to_string(),
                sector: sector.to_string(),
                name: record.name.clone(),
                intervention_id: *id,
                capital_cost: cost.is_finite().then_some(cost),
            })?;
        }
        Ok(accepted)
    }

    fn record(&self, component: &str, year: Year, event: &PlanEvent) -> PlanResult<()> {
        let entry = EventLogEntry {
            id:         None,
            run_id:     self.run_id.clone(),
            year,
            component:  component.to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        };
        self.registry.store().append_event(&entry)
    }
}
