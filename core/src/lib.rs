//! Infrastructure planning core.
//!
//! Codec, time series gateway, intervention registry and the yearly
//! critic/actor decision loop that sits between an orchestrator and its
//! sector models.

pub mod clock;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod event;
pub mod interval;
pub mod registry;
pub mod store;
pub mod timeseries;
pub mod types;
