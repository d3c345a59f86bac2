use crate::{
    decision::{CostTerm, DecisionModuleConfig},
    registry::InterventionRecord,
    timeseries::RegionLookup,
    types::Year,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Years to plan, strictly increasing. The first is the base year.
    pub horizon: Vec<Year>,
    /// Absent means no ceiling.
    #[serde(default)]
    pub budget_ceiling: Option<f64>,
    #[serde(default)]
    pub iteration: u32,
    /// The sector reference table.
    pub sectors: Vec<String>,
    #[serde(default)]
    pub decision_modules: Vec<DecisionModuleConfig>,
}

impl RunConfig {
    pub fn ceiling(&self) -> f64 {
        self.budget_ceiling.unwrap_or(f64::INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub run: RunConfig,
    pub regions: RegionLookup,
    /// Candidate register per sector, in file order.
    pub candidates: BTreeMap<String, Vec<InterventionRecord>>,
    /// (sector, file) pairs to import before the first year.
    pub initial_conditions: Vec<(String, PathBuf)>,
}

impl PlanConfig {
    /// Load from a data directory.
    /// In tests, use PlanConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let run_path = format!("{data_dir}/run.json");
        let run_content = std::fs::read_to_string(&run_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {run_path}: {e}"))?;
        let run: RunConfig = serde_json::from_str(&run_content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {run_path}: {e}"))?;
        if run.horizon.is_empty() {
            anyhow::bail!("{run_path}: horizon must list at least one year");
        }

        let regions_path = format!("{data_dir}/regions.json");
        let regions = if Path::new(&regions_path).exists() {
            let content = std::fs::read_to_string(&regions_path)
                .map_err(|e| anyhow::anyhow!("Cannot read {regions_path}: {e}"))?;
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Cannot parse {regions_path}: {e}"))?
        } else {
            RegionLookup::new()
        };

        let mut candidates = BTreeMap::new();
        for (sector, path) in sector_files(&format!("{data_dir}/candidates"))? {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
            let records: Vec<InterventionRecord> = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Cannot parse {}: {e}", path.display()))?;
            candidates
                .entry(sector)
                .or_insert_with(Vec::new)
                .extend(records);
        }

        let initial_conditions = sector_files(&format!("{data_dir}/initial_conditions"))?;

        Ok(Self {
            run,
            regions,
            candidates,
            initial_conditions,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let run = RunConfig {
            horizon: vec![2020, 2021, 2022],
            budget_ceiling: Some(500.0),
            iteration: 0,
            sectors: vec!["energy_supply".into(), "water_supply".into()],
            decision_modules: vec![
                DecisionModuleConfig::Energy {
                    sector: "energy_supply".into(),
                    model: "energy_supply".into(),
                    carbon_price: 0.0,
                },
                DecisionModuleConfig::GenericBudget {
                    sector: "water_supply".into(),
                    terms: vec![CostTerm::new("water_supply", "total_opex", 1.0)],
                },
            ],
        };

        let cost = |name: &str, c: f64| {
            InterventionRecord::new(name)
                .with_attribute("capital_cost", serde_json::json!({ "value": c, "unit": "GBP" }))
        };
        let mut candidates = BTreeMap::new();
        candidates.insert(
            "energy_supply".to_string(),
            vec![
                cost("ccgt_north", 300.0),
                cost("wind_offshore_a", 150.0),
                cost("battery_south", 100.0),
                InterventionRecord::new("nuclear_unpriced"),
            ],
        );
        candidates.insert(
            "water_supply".to_string(),
            vec![cost("reservoir_east", 400.0), cost("desal_coast", 250.0)],
        );

        let mut regions = RegionLookup::new();
        for (id, r) in ["north", "south", "east"].iter().enumerate() {
            regions.insert("electricity_demand", r, id as i64 + 1);
        }

        Self {
            run,
            regions,
            candidates,
            initial_conditions: Vec::new(),
        }
    }
}

/// `*.json` files in `dir` keyed by sector: the file stem, or the part of
/// it before `__` (`energy_supply__plants.json` -> `energy_supply`).
/// A missing directory yields nothing.
fn sector_files(dir: &str) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let dir = Path::new(dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Cannot list {}: {e}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let sector = stem.split("__").next().unwrap_or(stem).to_string();
        files.push((sector, path));
    }
    files.sort();
    Ok(files)
}
