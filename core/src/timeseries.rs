//! Time series gateway: (region × interval) arrays <-> timestep rows.
//!
//! Sector models exchange hourly data through the `input_timestep` and
//! `output_timestep` tables. Rows carry (year, season, day, period,
//! region_id, parameter, value); in memory the same data is a dense
//! region-by-interval array whose axes are given by the caller.
//!
//! Writes are idempotent per (parameter, year): existing rows for the
//! key are cleared before the new ones are inserted.

use crate::{
    error::{PlanError, PlanResult},
    interval::{self, IntervalKey},
    store::{PlanStore, TimestepRow, TimestepTable},
    types::{HourIndex, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dense row-major array: one row per region, one column per interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionIntervalArray {
    n_regions:   usize,
    n_intervals: usize,
    values:      Vec<f64>,
}

impl RegionIntervalArray {
    pub fn zeros(n_regions: usize, n_intervals: usize) -> Self {
        Self {
            n_regions,
            n_intervals,
            values: vec![0.0; n_regions * n_intervals],
        }
    }

    /// Build from nested rows. Every row must have the same length.
    pub fn from_nested(rows: Vec<Vec<f64>>) -> PlanResult<Self> {
        let n_regions = rows.len();
        let n_intervals = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != n_intervals) {
            return Err(PlanError::Other(anyhow::anyhow!(
                "ragged array: row {bad} has {} values, expected {n_intervals}",
                rows[bad].len()
            )));
        }
        Ok(Self {
            n_regions,
            n_intervals,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_regions, self.n_intervals)
    }

    pub fn get(&self, region: usize, interval: usize) -> Option<f64> {
        if region < self.n_regions && interval < self.n_intervals {
            Some(self.values[region * self.n_intervals + interval])
        } else {
            None
        }
    }

    pub fn set(&mut self, region: usize, interval: usize, value: f64) -> PlanResult<()> {
        if region >= self.n_regions || interval >= self.n_intervals {
            return Err(PlanError::IndexOutOfSet {
                kind: "cell",
                id:   format!("({region}, {interval}) in {}x{}", self.n_regions, self.n_intervals),
            });
        }
        self.values[region * self.n_intervals + interval] = value;
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Region name -> region id, keyed by parameter name.
///
/// Different parameters may be reported on different spatial resolutions,
/// so the lookup is always resolved through the parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionLookup {
    by_parameter: HashMap<String, HashMap<String, i64>>,
}

impl RegionLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parameter: &str, region: &str, id: i64) {
        self.by_parameter
            .entry(parameter.to_string())
            .or_default()
            .insert(region.to_string(), id);
    }

    pub fn region_id(&self, parameter: &str, region: &str) -> Option<i64> {
        self.by_parameter.get(parameter)?.get(region).copied()
    }

    pub fn region_name(&self, parameter: &str, id: i64) -> Option<&str> {
        self.by_parameter
            .get(parameter)?
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }
}

/// One cell after the stored season/day/period has been turned back into an hour.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionIntervalValue {
    pub region: String,
    pub hour:   HourIndex,
    pub value:  f64,
}

pub struct TimeSeriesGateway {
    store:   PlanStore,
    regions: RegionLookup,
}

impl TimeSeriesGateway {
    pub fn new(store: PlanStore, regions: RegionLookup) -> Self {
        Self { store, regions }
    }

    pub fn regions(&self) -> &RegionLookup {
        &self.regions
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    /// Flatten `array` into one row per cell.
    pub fn to_rows(
        &self,
        array: &RegionIntervalArray,
        region_names: &[String],
        interval_ids: &[HourIndex],
        year: Year,
        parameter: &str,
    ) -> PlanResult<Vec<TimestepRow>> {
        check_shape(array, region_names, interval_ids)?;

        let keys = interval_ids
            .iter()
            .map(|&h| interval::decode_triple(h))
            .collect::<PlanResult<Vec<IntervalKey>>>()?;

        let mut rows = Vec::with_capacity(region_names.len() * interval_ids.len());
        for (r, region) in region_names.iter().enumerate() {
            let region_id = self.regions.region_id(parameter, region).ok_or_else(|| {
                PlanError::Lookup {
                    parameter: parameter.to_string(),
                    region:    region.clone(),
                }
            })?;
            for (i, key) in keys.iter().enumerate() {
                rows.push(TimestepRow {
                    year,
                    season: key.season,
                    day: key.day,
                    period: key.period,
                    region_id,
                    parameter: parameter.to_string(),
                    value: array.values[r * array.n_intervals + i],
                });
            }
        }
        Ok(rows)
    }

    /// Rebuild an array from decoded cells. Cells not present stay 0.0.
    pub fn from_rows(
        rows: &[RegionIntervalValue],
        region_names: &[String],
        interval_ids: &[HourIndex],
    ) -> PlanResult<RegionIntervalArray> {
        let region_pos: HashMap<&str, usize> = region_names
            .iter()
            .enumerate()
            .map(|(i, r)| (r.as_str(), i))
            .collect();
        let interval_pos: HashMap<HourIndex, usize> = interval_ids
            .iter()
            .enumerate()
            .map(|(i, &h)| (h, i))
            .collect();

        let mut array = RegionIntervalArray::zeros(region_names.len(), interval_ids.len());
        for row in rows {
            let r = *region_pos
                .get(row.region.as_str())
                .ok_or_else(|| PlanError::IndexOutOfSet {
                    kind: "region",
                    id:   row.region.clone(),
                })?;
            let i = *interval_pos
                .get(&row.hour)
                .ok_or_else(|| PlanError::IndexOutOfSet {
                    kind: "interval",
                    id:   row.hour.to_string(),
                })?;
            array.set(r, i, row.value)?;
        }
        Ok(array)
    }

    /// Write an array for (parameter, year), replacing any earlier write.
    pub fn write(
        &self,
        table: TimestepTable,
        array: &RegionIntervalArray,
        region_names: &[String],
        interval_ids: &[HourIndex],
        year: Year,
        parameter: &str,
    ) -> PlanResult<usize> {
        let rows = self.to_rows(array, region_names, interval_ids, year, parameter)?;
        let n = self.store.replace_timesteps(table, parameter, year, &rows)?;
        log::debug!("year={year} timeseries: wrote {n} rows for '{parameter}'");
        Ok(n)
    }

    pub fn read(
        &self,
        table: TimestepTable,
        parameter: &str,
        year: Year,
        region_names: &[String],
        interval_ids: &[HourIndex],
    ) -> PlanResult<RegionIntervalArray> {
        let stored = self.store.timesteps(table, parameter, year)?;
        let mut cells = Vec::with_capacity(stored.len());
        for row in stored {
            let region = self
                .regions
                .region_name(parameter, row.region_id)
                .ok_or_else(|| PlanError::IndexOutOfSet {
                    kind: "region id",
                    id:   row.region_id.to_string(),
                })?;
            let hour = interval::encode_triple(IntervalKey::new(row.season, row.day, row.period))?;
            cells.push(RegionIntervalValue {
                region: region.to_string(),
                hour,
                value: row.value,
            });
        }
        Self::from_rows(&cells, region_names, interval_ids)
    }

    pub fn write_input(
        &self,
        array: &RegionIntervalArray,
        region_names: &[String],
        interval_ids: &[HourIndex],
        year: Year,
        parameter: &str,
    ) -> PlanResult<usize> {
        self.write(TimestepTable::Input, array, region_names, interval_ids, year, parameter)
    }

    pub fn write_output(
        &self,
        array: &RegionIntervalArray,
        region_names: &[String],
        interval_ids: &[HourIndex],
        year: Year,
        parameter: &str,
    ) -> PlanResult<usize> {
        self.write(TimestepTable::Output, array, region_names, interval_ids, year, parameter)
    }

    pub fn read_input(
        &self,
        parameter: &str,
        year: Year,
        region_names: &[String],
        interval_ids: &[HourIndex],
    ) -> PlanResult<RegionIntervalArray> {
        self.read(TimestepTable::Input, parameter, year, region_names, interval_ids)
    }

    pub fn read_output(
        &self,
        parameter: &str,
        year: Year,
        region_names: &[String],
        interval_ids: &[HourIndex],
    ) -> PlanResult<RegionIntervalArray> {
        self.read(TimestepTable::Output, parameter, year, region_names, interval_ids)
    }
}

fn check_shape(
    array: &RegionIntervalArray,
    region_names: &[String],
    interval_ids: &[HourIndex],
) -> PlanResult<()> {
    if array.shape() != (region_names.len(), interval_ids.len()) {
        return Err(PlanError::Other(anyhow::anyhow!(
            "array shape {:?} does not match {} regions × {} intervals",
            array.shape(),
            region_names.len(),
            interval_ids.len()
        )));
    }
    Ok(())
}
