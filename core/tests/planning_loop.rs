//! Yearly critic/actor loop tests, run against PlanConfig::default_test().
//!
//! Default test setup: ceiling 500, horizon 2020..=2022.
//!   energy_supply: ccgt_north 300, wind_offshore_a 150, battery_south 100, nuclear_unpriced (no cost)
//!   water_supply:  reservoir_east 400, desal_coast 250

use infraplan_core::{
    config::PlanConfig,
    decision::DecisionRecord,
    engine::{PlanEngine, SectorModelRunner},
    error::{PlanError, PlanResult},
    event::PlanEvent,
    registry::InterventionRecord,
    store::PlanStore,
    types::Year,
};
use serde_json::json;
use std::io::Write;
use std::sync::atomic::AtomicBool;

fn build(run_id: &str) -> PlanEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    PlanEngine::build_test(run_id.to_string()).expect("build_test failed")
}

fn names(decisions: &[DecisionRecord]) -> Vec<&str> {
    decisions.iter().map(|d| d.name.as_str()).collect()
}

/// Reports the same operating cost for every sector model every year.
struct FlatCostRunner {
    energy: f64,
    water: f64,
}

impl SectorModelRunner for FlatCostRunner {
    fn run_year(&mut self, year: Year, _: &[DecisionRecord], store: &PlanStore) -> PlanResult<()> {
        store.insert_model_result("energy_supply", "total_opex", year, 0, None, self.energy)?;
        store.insert_model_result("water_supply", "total_opex", year, 0, None, self.water)?;
        Ok(())
    }
}

#[test]
fn decisions_fill_each_years_budget_cheapest_first() {
    let mut engine = build("loop-t1");
    let outcomes = engine.run_all().unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        names(&outcomes[0].decisions),
        vec!["battery_south", "wind_offshore_a", "desal_coast"]
    );
    assert_eq!(names(&outcomes[1].decisions), vec!["ccgt_north", "reservoir_east"]);
    assert!(outcomes[2].decisions.is_empty(), "only the unpriced plant is left");
    assert!(outcomes.iter().flat_map(|o| &o.decisions).all(|d| d.build_year >= 2020));
}

#[test]
fn built_interventions_join_the_registry_with_their_year() {
    let mut engine = build("loop-t2");
    engine.run_all().unwrap();

    let reg = &engine.registry;
    assert_eq!(
        reg.built_in_year("energy_supply", 2020).unwrap(),
        vec!["battery_south", "wind_offshore_a"]
    );
    assert_eq!(reg.built_in_year("energy_supply", 2021).unwrap(), vec!["ccgt_north"]);
    assert_eq!(reg.intervention_count("water_supply").unwrap(), 2);

    let sets = reg.sets("energy_supply").unwrap();
    assert_eq!(sets.len(), 2, "one set per year with decisions");
    assert_eq!(sets[0].interventions.len(), 2);
}

#[test]
fn previous_year_costs_shrink_the_budget() {
    let mut engine = build("loop-t3");
    engine.set_model_runner(Box::new(FlatCostRunner { energy: 350.0, water: 200.0 }));
    let outcomes = engine.run_all().unwrap();

    // 2021: energy has 150 left (ccgt 300 does not fit), water 300 (reservoir 400 does not fit).
    assert!(outcomes[1].decisions.is_empty());
    let budgets: Vec<f64> = outcomes[1].budgets.iter().map(|(_, b)| b.remaining_budget).collect();
    assert_eq!(budgets, vec![150.0, 300.0]);
}

#[test]
fn event_log_records_budgets_and_builds_in_order() {
    let mut engine = build("loop-t4");
    engine.step().unwrap();

    let events = engine.events_for_year(2020).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "run_initialized",
            "year_started",
            "budget_computed",
            "intervention_built",
            "intervention_built",
            "budget_computed",
            "intervention_built",
            "sector_models_run",
            "year_completed",
        ]
    );

    let built: PlanEvent = serde_json::from_str(&events[3].payload).unwrap();
    match built {
        PlanEvent::InterventionBuilt { name, capital_cost, sector, .. } => {
            assert_eq!(name, "battery_south");
            assert_eq!(sector, "energy_supply");
            assert_eq!(capital_cost, Some(100.0));
        }
        other => panic!("expected InterventionBuilt, got {other:?}"),
    }
}

#[test]
fn cancellation_is_honoured_between_years() {
    let mut engine = build("loop-t5");
    engine.step().unwrap();

    let cancel = AtomicBool::new(true);
    match engine.run(&cancel) {
        Err(PlanError::Cancelled { year }) => assert_eq!(year, 2021),
        other => panic!("expected Cancelled, got {other:?}"),
    }
    // 2020 stays complete; nothing from 2021 was started.
    assert!(engine.events_for_year(2021).unwrap().is_empty());
    assert_eq!(engine.clock.current_year(), Some(2020));
}

#[test]
fn initial_conditions_are_not_offered_again() {
    let mut engine = build("loop-t6");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{ "name": "battery_south", "type": "storage", "build_year": 2015,
              "capital_cost": {{ "value": 100, "unit": "GBP" }} }}]"#
    )
    .unwrap();
    let reports = engine
        .import_initial_conditions(&[("energy_supply".to_string(), file.path().to_path_buf())])
        .unwrap();
    assert_eq!(reports[0].ingested.len(), 1);

    let first = engine.step().unwrap().unwrap();
    let energy: Vec<&str> = names(&first.decisions).into_iter().take(2).collect();
    assert_eq!(energy, vec!["wind_offshore_a", "ccgt_north"]);
}

#[test]
fn same_config_produces_identical_event_logs() {
    let mut a = build("det");
    let mut b = build("det");
    a.run_all().unwrap();
    b.run_all().unwrap();

    for year in [2020, 2021, 2022] {
        let log_a: Vec<String> = a.events_for_year(year).unwrap().into_iter().map(|e| e.payload).collect();
        let log_b: Vec<String> = b.events_for_year(year).unwrap().into_iter().map(|e| e.payload).collect();
        assert_eq!(log_a, log_b, "event logs diverged in {year}");
    }
}

#[test]
fn finished_engine_steps_to_none() {
    let mut engine = build("loop-t8");
    engine.run_all().unwrap();
    assert!(engine.clock.is_finished());
    assert!(engine.step().unwrap().is_none());
}

#[test]
fn decisions_report_only_what_the_registry_recorded() {
    let mut engine = build("loop-t9");
    engine.set_candidates(
        "energy_supply",
        vec![
            InterventionRecord::new("good").with_attribute("capital_cost", json!(1)),
            InterventionRecord::new("bad")
                .with_attribute("capital_cost", json!(2))
                .with_attribute("cost (GBP)", json!(5)),
            InterventionRecord::new("after_bad").with_attribute("capital_cost", json!(3)),
        ],
    );

    let outcome = engine.step().unwrap().unwrap();
    assert_eq!(names(&outcome.decisions), vec!["good", "desal_coast"]);
    assert_eq!(engine.registry.built_in_year("energy_supply", 2020).unwrap(), vec!["good"]);
    assert_eq!(engine.registry.built_in_year("water_supply", 2020).unwrap(), vec!["desal_coast"]);

    let events = engine.events_for_year(2020).unwrap();
    let built = events.iter().filter(|e| e.event_type == "intervention_built").count();
    assert_eq!(built, outcome.decisions.len());
    let completed: PlanEvent = serde_json::from_str(&events.last().unwrap().payload).unwrap();
    assert_eq!(completed, PlanEvent::YearCompleted { year: 2020, decisions: 2 });

    // Unrecorded candidates stay open; `bad` stops the energy batch again.
    let next = engine.step().unwrap().unwrap();
    assert_eq!(names(&next.decisions), vec!["reservoir_east"]);
    assert_eq!(engine.registry.built_names("energy_supply").unwrap(), vec!["good"]);
}

#[test]
fn empty_horizon_is_an_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("run.json"),
        r#"{ "horizon": [], "sectors": ["energy_supply"] }"#,
    )
    .unwrap();
    let err = PlanConfig::load(dir.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("horizon"), "got {err}");

    let mut config = PlanConfig::default_test();
    config.run.horizon.clear();
    let store = PlanStore::in_memory().unwrap();
    store.migrate().unwrap();
    assert!(PlanEngine::build("loop-t10".into(), &config, store).is_err());
}
