//! Shared primitive types used across the planning core.

/// A simulated year. One pass of the decision loop = one year.
pub type Year = i64;

/// 1-based linear hour position within a simulated (non-leap) year.
pub type HourIndex = u32;

/// Row id in the master `interventions` catalogue.
pub type InterventionId = i64;

/// The canonical run identifier.
pub type RunId = String;
