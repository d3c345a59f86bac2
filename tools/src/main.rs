//! plan-runner: headless runner for the yearly intervention planning loop.
//!
//! Usage:
//!   plan-runner --data-dir ./data --db plan.db
//!   plan-runner --data-dir ./data --results results.json
//!   plan-runner --data-dir ./data --ipc-mode
//!
//! In IPC mode the orchestrator drives the run one year at a time over
//! stdin/stdout (one JSON object per line) and feeds sector model results
//! back in between years.

use anyhow::Result;
use infraplan_core::{
    config::PlanConfig,
    decision::DecisionRecord,
    engine::{PlanEngine, SectorModelRunner, YearOutcome},
    error::PlanResult,
    store::PlanStore,
    types::Year,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::atomic::AtomicBool;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Step,
    RecordResult(ResultEntry),
    Quit,
}

/// One summed sector model output, as replayed from a results file or sent over IPC.
#[derive(Debug, Clone, serde::Deserialize)]
struct ResultEntry {
    model: String,
    output: String,
    year: Year,
    #[serde(default)]
    iteration: u32,
    #[serde(default)]
    region: Option<String>,
    value: f64,
}

#[derive(serde::Serialize)]
struct UiState {
    run_id: String,
    current_year: Option<Year>,
    next_year: Option<Year>,
    finished: bool,
    built_this_year: Vec<DecisionRecord>,
    total_interventions: i64,
}

/// Stands in for the sector models by replaying recorded outputs year by year.
struct ReplayModelRunner {
    entries: Vec<ResultEntry>,
}

impl SectorModelRunner for ReplayModelRunner {
    fn run_year(&mut self, year: Year, _: &[DecisionRecord], store: &PlanStore) -> PlanResult<()> {
        let mut replayed = 0usize;
        for e in self.entries.iter().filter(|e| e.year == year) {
            store.insert_model_result(
                &e.model,
                &e.output,
                e.year,
                e.iteration,
                e.region.as_deref(),
                e.value,
            )?;
            replayed += 1;
        }
        log::debug!("year={year} replay: recorded {replayed} model result(s)");
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let results = string_arg(&args, "--results");

    let config = PlanConfig::load(data_dir)?;

    if !ipc_mode {
        println!("plan-runner");
        println!("  data_dir:  {data_dir}");
        println!("  db:        {db}");
        println!("  horizon:   {:?}", config.run.horizon);
        println!(
            "  ceiling:   {}",
            config
                .run
                .budget_ceiling
                .map_or("unlimited".to_string(), |c| format!("{c:.2}"))
        );
        println!();
    }

    let store = if db == ":memory:" {
        PlanStore::in_memory()?
    } else {
        PlanStore::open(db)?
    };
    store.migrate()?;

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    let mut engine = PlanEngine::build(run_id, &config, store)?;
    engine.registry.store().insert_run(
        &engine.run_id,
        engine.clock.base_year(),
        env!("CARGO_PKG_VERSION"),
    )?;
    let reports = engine.import_initial_conditions(&config.initial_conditions)?;
    let skipped_files = reports.iter().filter(|r| r.error.is_some()).count();
    if skipped_files > 0 {
        log::warn!("{skipped_files} initial-conditions file(s) only partly imported");
    }

    if let Some(path) = results {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let entries: Vec<ResultEntry> = serde_json::from_str(&content)?;
        engine.set_model_runner(Box::new(ReplayModelRunner { entries }));
    }

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        let cancel = AtomicBool::new(false);
        let outcomes = engine.run(&cancel)?;
        print_summary(&engine, &config, &outcomes)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &mut PlanEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let mut last_decisions: Vec<DecisionRecord> = Vec::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Step => {
                if let Some(outcome) = engine.step()? {
                    last_decisions = outcome.decisions;
                }
                let state = build_ui_state(engine, &last_decisions)?;
                writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
            }
            IpcCommand::GetState => {
                let state = build_ui_state(engine, &last_decisions)?;
                writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
            }
            IpcCommand::RecordResult(e) => {
                engine.registry.store().insert_model_result(
                    &e.model,
                    &e.output,
                    e.year,
                    e.iteration,
                    e.region.as_deref(),
                    e.value,
                )?;
                writeln!(stdout, "{}", serde_json::json!({ "ok": true }))?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(engine: &PlanEngine, built: &[DecisionRecord]) -> Result<UiState> {
    let mut total_interventions = 0;
    for sector in engine.registry.store().sectors()? {
        total_interventions += engine.registry.intervention_count(&sector)?;
    }
    Ok(UiState {
        run_id: engine.run_id.clone(),
        current_year: engine.clock.current_year(),
        next_year: engine.clock.next_year(),
        finished: engine.clock.is_finished(),
        built_this_year: built.to_vec(),
        total_interventions,
    })
}

fn print_summary(engine: &PlanEngine, config: &PlanConfig, outcomes: &[YearOutcome]) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:      {}", engine.run_id);
    println!("  years run:   {}", outcomes.len());

    println!();
    println!("=== DECISIONS ===");
    for o in outcomes {
        let names: Vec<&str> = o.decisions.iter().map(|d| d.name.as_str()).collect();
        let budgets: Vec<String> = o
            .budgets
            .iter()
            .map(|(m, b)| {
                if b.remaining_budget.is_finite() {
                    format!("{m}={:.0}", b.remaining_budget)
                } else {
                    format!("{m}=unlimited")
                }
            })
            .collect();
        println!("  {} | budgets: {} | built: {}", o.year, budgets.join(", "), names.join(", "));
    }

    println!();
    println!("=== CATALOGUE ===");
    for sector in &config.run.sectors {
        let count = engine.registry.intervention_count(sector)?;
        let columns = engine.registry.sector_columns(sector)?;
        println!("  {sector}: {count} intervention(s), {} attribute column(s)", columns.len());
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
