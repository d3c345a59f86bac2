//! Interval codec: hour-of-year index <-> (season, day, period) keys.
//!
//! Each season is represented by one repeating 168-hour week. The four
//! representative seasons cover hours 1..=672; later hours of the year
//! continue into further week blocks, so the mapping stays a bijection
//! over the whole 8760-hour year.
//!
//! Two tabular shapes exist downstream:
//!   - the triple form (season, day 1..=7, period 1..=24)
//!   - the pair form "season_period" with period 1..=168

use crate::{
    error::{PlanError, PlanResult},
    types::HourIndex,
};
use serde::{Deserialize, Serialize};

pub const REPRESENTATIVE_SEASONS: u32 = 4;
pub const DAYS_PER_WEEK: u32 = 7;
pub const HOURS_PER_DAY: u32 = 24;
pub const HOURS_PER_WEEK: u32 = DAYS_PER_WEEK * HOURS_PER_DAY; // 168
pub const MAX_HOUR: HourIndex = 8760; // non-leap year
/// Last (partial) week block reachable from MAX_HOUR.
pub const MAX_SEASON: u32 = MAX_HOUR.div_ceil(HOURS_PER_WEEK); // 53

/// Separator used by the pair key form.
pub const PAIR_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalKey {
    pub season: u32,
    pub day:    u32,
    pub period: u32,
}

impl IntervalKey {
    pub fn new(season: u32, day: u32, period: u32) -> Self {
        Self { season, day, period }
    }

    pub fn is_valid(&self) -> bool {
        (1..=MAX_SEASON).contains(&self.season)
            && (1..=DAYS_PER_WEEK).contains(&self.day)
            && (1..=HOURS_PER_DAY).contains(&self.period)
    }

    /// True for keys inside the four representative seasonal weeks.
    pub fn is_representative(&self) -> bool {
        self.is_valid() && self.season <= REPRESENTATIVE_SEASONS
    }

    /// Period within the seasonal week (1..=168), as used by the pair form.
    pub fn week_period(&self) -> u32 {
        (self.day - 1) * HOURS_PER_DAY + self.period
    }
}

/// Split an hour index into its (season, day, period) key.
pub fn decode_triple(hour: HourIndex) -> PlanResult<IntervalKey> {
    if !(1..=MAX_HOUR).contains(&hour) {
        return Err(PlanError::Range { hour: hour as i64, max: MAX_HOUR as i64 });
    }
    let season = (hour - 1) / HOURS_PER_WEEK + 1;
    let rem = (hour - 1) % HOURS_PER_WEEK;
    Ok(IntervalKey {
        season,
        day:    rem / HOURS_PER_DAY + 1,
        period: rem % HOURS_PER_DAY + 1,
    })
}

/// Inverse of [`decode_triple`].
pub fn encode_triple(key: IntervalKey) -> PlanResult<HourIndex> {
    let out_of_range = || PlanError::KeyRange {
        season: key.season,
        day:    key.day,
        period: key.period,
    };
    if !key.is_valid() {
        return Err(out_of_range());
    }
    let hour = 1 + HOURS_PER_WEEK * (key.season - 1) + HOURS_PER_DAY * (key.day - 1) + (key.period - 1);
    if hour > MAX_HOUR {
        return Err(out_of_range());
    }
    Ok(hour)
}

/// Parse a "season_period" key. Period is 1..=168 in this form.
pub fn decode_pair(key: &str) -> PlanResult<(u32, u32)> {
    let format_err = |reason: &str| PlanError::Format {
        key:    key.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = key.split(PAIR_SEPARATOR);
    let (season, period) = match (parts.next(), parts.next(), parts.next()) {
        (Some(s), Some(p), None) => (s, p),
        _ => return Err(format_err("expected exactly one separator")),
    };
    let season: u32 = season
        .trim()
        .parse()
        .map_err(|_| format_err("season is not an integer"))?;
    let period: u32 = period
        .trim()
        .parse()
        .map_err(|_| format_err("period is not an integer"))?;

    if !(1..=MAX_SEASON).contains(&season) || !(1..=HOURS_PER_WEEK).contains(&period) {
        return Err(format_err("season or period out of range"));
    }
    Ok((season, period))
}

pub fn encode_pair(season: u32, period: u32) -> String {
    format!("{season}{PAIR_SEPARATOR}{period}")
}

/// Day of the seasonal week for a 1..=168 period.
pub fn day_of_period(period: u32) -> u32 {
    period.saturating_sub(1) / HOURS_PER_DAY + 1
}

/// Resolve a pair key straight to an hour index.
pub fn hour_from_pair(key: &str) -> PlanResult<HourIndex> {
    let (season, period) = decode_pair(key)?;
    let day = day_of_period(period);
    let period_of_day = (period - 1) % HOURS_PER_DAY + 1;
    encode_triple(IntervalKey::new(season, day, period_of_day))
}

/// Render an hour index in pair form.
pub fn pair_from_hour(hour: HourIndex) -> PlanResult<String> {
    let key = decode_triple(hour)?;
    Ok(encode_pair(key.season, key.week_period()))
}
