//! Agent-based marketing-diffusion simulator with evolutionary
//! calibration.
//!
//! The simulator turns an aggregate seasonality signal into discrete
//! purchase events across an agent population (awareness, perceptions,
//! word-of-mouth, decision-cycle cool-downs); the calibration framework
//! fits scenario parameters to historical sales with differential
//! evolution (tournament-based steady state, SHADE or L-SHADE).

pub mod analysis;
pub mod calibrate;
pub mod config;
pub mod decision;
pub mod engine;
pub mod evolution;
pub mod manager;
pub mod model;
pub mod scheduler;
pub mod stats;
