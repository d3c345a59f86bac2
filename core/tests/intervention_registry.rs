//! Intervention registry tests.
//!
//! Verifies:
//!   - schema growth is idempotent and case-insensitive
//!   - null attributes never produce a column or a value
//!   - nested attributes flatten to `{key}_{subkey}` columns
//!   - a batch's intervention set records exactly the ids it assigned
//!   - an unknown sector stops a file but keeps what came before it
//!   - concurrent column adds for one sector never collide
//!   - batches and standalone column adds share one lock order

use infraplan_core::{
    error::PlanError,
    registry::{InterventionRecord, InterventionRegistry, INITIAL_CONDITIONS_SET},
    store::PlanStore,
};
use rusqlite::types::Value as SqlValue;
use serde_json::json;
use std::io::Write;

fn registry(sectors: &[&str]) -> InterventionRegistry {
    let store = PlanStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let registry = InterventionRegistry::new(store);
    for s in sectors {
        registry.register_sector(s).expect("register sector");
    }
    registry
}

fn plant(name: &str) -> InterventionRecord {
    InterventionRecord::new(name)
        .with_attribute("capacity", json!({ "value": 1200, "unit": "MW" }))
        .with_attribute("technology", json!("ccgt"))
}

#[test]
fn ensure_column_twice_adds_one_column() {
    let reg = registry(&["energy_supply"]);
    reg.ensure_sector_table("energy_supply").unwrap();

    assert!(reg.ensure_column("energy_supply", "capacity").unwrap());
    assert!(!reg.ensure_column("energy_supply", "capacity").unwrap());
    assert!(!reg.ensure_column("energy_supply", "CAPACITY").unwrap());

    let columns = reg.sector_columns("energy_supply").unwrap();
    assert_eq!(columns, vec!["capacity".to_string()]);
}

#[test]
fn ensure_sector_table_is_idempotent() {
    let reg = registry(&["water_supply"]);
    assert!(reg.ensure_sector_table("water_supply").unwrap());
    assert!(!reg.ensure_sector_table("Water_Supply").unwrap());
}

#[test]
fn nested_attributes_flatten_into_columns() {
    let reg = registry(&["energy_supply"]);
    let id = reg.add_intervention(&plant("ccgt_a"), "energy_supply").unwrap();

    let columns = reg.sector_columns("energy_supply").unwrap();
    // Attribute maps iterate in key order.
    assert_eq!(columns, vec!["capacity_unit", "capacity_value", "technology"]);

    let stored = reg.store().sector_attribute("energy_supply", id, "capacity_unit").unwrap();
    assert_eq!(stored, Some(SqlValue::Text("MW".into())));
}

#[test]
fn null_attributes_are_never_stored() {
    let reg = registry(&["energy_supply"]);
    let record = plant("ccgt_b")
        .with_attribute("decommission_year", json!(null))
        .with_attribute("location", json!({ "lat": null, "lon": -1.5 }));
    reg.add_intervention(&record, "energy_supply").unwrap();

    let columns = reg.sector_columns("energy_supply").unwrap();
    assert!(!columns.contains(&"decommission_year".to_string()), "null attribute got a column");
    assert!(!columns.contains(&"location_lat".to_string()), "null sub-attribute got a column");
    assert!(columns.contains(&"location_lon".to_string()));
}

#[test]
fn lists_are_stored_as_json_arrays() {
    let reg = registry(&["transport"]);
    let record = InterventionRecord::new("rail_link").with_attribute("stations", json!(["a", "b"]));
    let id = reg.add_intervention(&record, "transport").unwrap();

    let stored = reg.store().sector_attribute("transport", id, "stations").unwrap();
    assert_eq!(stored, Some(SqlValue::Text(r#"["a","b"]"#.into())));
}

#[test]
fn later_records_grow_the_schema() {
    let reg = registry(&["energy_supply"]);
    reg.add_intervention(&plant("ccgt_a"), "energy_supply").unwrap();
    let with_extra = plant("ccgt_c").with_attribute("Heat_Rate", json!(7.1));
    reg.add_intervention(&with_extra, "energy_supply").unwrap();

    let columns = reg.sector_columns("energy_supply").unwrap();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns.last().unwrap(), "heat_rate");
}

#[test]
fn unknown_sector_is_rejected_without_writing() {
    let reg = registry(&["energy_supply"]);
    match reg.add_intervention(&plant("pump"), "water_supply") {
        Err(PlanError::UnknownSector { sector, intervention }) => {
            assert_eq!(sector, "water_supply");
            assert_eq!(intervention, "pump");
        }
        other => panic!("expected UnknownSector, got {other:?}"),
    }
    assert_eq!(reg.store().max_intervention_id().unwrap(), 0);
}

#[test]
fn duplicate_names_within_a_sector_are_rejected() {
    let reg = registry(&["energy_supply"]);
    reg.add_intervention(&plant("ccgt_a"), "energy_supply").unwrap();
    let err = reg.add_intervention(&plant("ccgt_a"), "energy_supply").unwrap_err();
    assert!(matches!(err, PlanError::DuplicateIntervention { .. }));
}

#[test]
fn attributes_folding_to_one_column_are_rejected() {
    let reg = registry(&["energy_supply"]);

    let cased = InterventionRecord::new("ccgt_a")
        .with_attribute("Capacity", json!(1200))
        .with_attribute("capacity", json!(1300));
    let err = reg.add_intervention(&cased, "energy_supply").unwrap_err();
    assert!(matches!(err, PlanError::InvalidIdentifier(_)), "got {err:?}");

    let nested = InterventionRecord::new("ccgt_b")
        .with_attribute("capacity", json!({ "value": 1200 }))
        .with_attribute("capacity_value", json!(1300));
    let err = reg.add_intervention(&nested, "energy_supply").unwrap_err();
    assert!(matches!(err, PlanError::InvalidIdentifier(_)), "got {err:?}");

    assert_eq!(reg.store().max_intervention_id().unwrap(), 0, "nothing may be written");
    assert!(reg.sector_columns("energy_supply").unwrap().is_empty());
}

#[test]
fn batch_set_records_exactly_the_new_ids() {
    let reg = registry(&["energy_supply", "water_supply"]);

    // Some unrelated history first, so ids do not start at 1.
    let pre: Vec<_> = (0..3).map(|i| plant(&format!("pre_{i}"))).collect();
    reg.ingest_batch(&pre, "water_supply", "history", "").unwrap();

    let batch: Vec<_> = (0..5).map(|i| plant(&format!("plant_{i}"))).collect();
    let report = reg
        .ingest_batch(&batch, "energy_supply", INITIAL_CONDITIONS_SET, "test batch")
        .unwrap();

    assert_eq!(report.ingested, vec![4, 5, 6, 7, 8]);
    let sets = reg.sets("energy_supply").unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].interventions, report.ingested);
    assert_eq!(sets[0].name, INITIAL_CONDITIONS_SET);
    assert_eq!(reg.intervention_count("energy_supply").unwrap(), 5);
}

#[test]
fn stored_record_reads_back_intact() {
    let reg = registry(&["energy_supply"]);
    let mut record = plant("ccgt_a");
    record.intervention_type = Some("power_station".into());
    record.build_year = Some(2015);
    let id = reg.add_intervention(&record, "energy_supply").unwrap();

    let back = reg.get_intervention(id).unwrap().expect("stored intervention");
    assert_eq!(back.sector, "energy_supply");
    assert_eq!(back.record, record);
    assert_eq!(reg.built_in_year("energy_supply", 2015).unwrap(), vec!["ccgt_a"]);
    assert!(reg.built_in_year("energy_supply", 2016).unwrap().is_empty());
}

#[test]
fn import_skips_the_rest_of_a_file_after_an_unknown_sector() {
    let reg = registry(&["water_supply"]);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let records = json!([
        { "name": "pipe_a", "capacity": 10 },
        { "name": "pipe_b", "sector": "sewers", "capacity": 12 },
        { "name": "pipe_c", "capacity": 14 }
    ]);
    write!(file, "{records}").unwrap();

    let report = reg.import_file(file.path(), "water_supply").unwrap();
    assert_eq!(report.ingested.len(), 1);
    assert_eq!(report.skipped, 2);
    assert!(report.error.as_deref().unwrap_or_default().contains("sewers"));

    assert_eq!(reg.built_names("water_supply").unwrap(), vec!["pipe_a"]);
    let sets = reg.sets("water_supply").unwrap();
    assert_eq!(sets[0].interventions, report.ingested);
}

#[test]
fn concurrent_column_adds_for_one_sector_add_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.db");
    let path = path.to_str().unwrap();

    let store = PlanStore::open(path).unwrap();
    store.migrate().unwrap();
    let reg = InterventionRegistry::new(store);
    reg.register_sector("energy_supply").unwrap();
    reg.ensure_sector_table("energy_supply").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = PlanStore::open(path).unwrap();
            let reg = InterventionRegistry::with_schema(store, reg.schema().clone());
            std::thread::spawn(move || {
                let name = if i % 2 == 0 { "Capacity" } else { "capacity" };
                (0..5)
                    .map(|_| reg.ensure_column("energy_supply", name).unwrap())
                    .filter(|added| *added)
                    .count()
            })
        })
        .collect();

    let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(added, 1, "column added {added} times");
    assert_eq!(reg.sector_columns("energy_supply").unwrap(), vec!["capacity"]);
}

#[test]
fn batches_and_column_adds_run_side_by_side() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.db");
    let path = path.to_str().unwrap().to_string();

    let store = PlanStore::open(&path).unwrap();
    store.migrate().unwrap();
    let reg = InterventionRegistry::new(store);
    reg.register_sector("energy_supply").unwrap();
    reg.ensure_sector_table("energy_supply").unwrap();

    let batch_reg = InterventionRegistry::with_schema(PlanStore::open(&path).unwrap(), reg.schema().clone());
    let column_reg = InterventionRegistry::with_schema(PlanStore::open(&path).unwrap(), reg.schema().clone());

    let batches = std::thread::spawn(move || {
        let mut errors = Vec::new();
        for b in 0..10 {
            let records: Vec<InterventionRecord> = (0..5)
                .map(|r| {
                    InterventionRecord::new(format!("plant_{b}_{r}"))
                        .with_attribute(&format!("rating_{b}_{r}"), json!(r))
                })
                .collect();
            match batch_reg.ingest_batch(&records, "energy_supply", "batch", "side by side") {
                Ok(report) if report.error.is_none() => {}
                Ok(report) => errors.push(report.error.unwrap_or_default()),
                Err(e) => errors.push(e.to_string()),
            }
        }
        errors
    });
    let columns = std::thread::spawn(move || {
        (0..20)
            .filter_map(|i| column_reg.ensure_column("energy_supply", &format!("extra_{i}")).err())
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
    });

    let batch_errors = batches.join().unwrap();
    let column_errors = columns.join().unwrap();
    assert!(batch_errors.is_empty(), "batch errors: {batch_errors:?}");
    assert!(column_errors.is_empty(), "column errors: {column_errors:?}");

    assert_eq!(reg.intervention_count("energy_supply").unwrap(), 50);
    assert_eq!(reg.sector_columns("energy_supply").unwrap().len(), 70);
    assert_eq!(reg.sets("energy_supply").unwrap().len(), 10);
}
