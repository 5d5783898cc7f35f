//! Genetic-algorithm optimizer for overcurrent relay time-coordination.
//!
//! A power network protects each line with a "main" relay and a "backup"
//! relay; coordination requires the backup to trip only after the main plus a
//! discrimination margin (the coordination time interval, CTI). Each relay has
//! two tunable settings, a time-dial setting (TDS) and a pickup current, and
//! this crate searches that setting space with a Chu & Beasley style genetic
//! algorithm to drive the total miscoordination time (TMT) of a scenario to
//! zero.
//!
//! The pipeline: [`scenario`] loads and validates relay-pair data,
//! [`curve`] computes IEC inverse-time operating times, [`evaluation`] turns a
//! candidate setting vector into coordination margins and a scalar fitness,
//! [`evolution`] runs the population search, and [`runner`] orchestrates one
//! engine run per scenario and reports before/after metrics.

pub mod config;
pub mod curve;
pub mod evaluation;
pub mod evolution;
pub mod export;
pub mod runner;
pub mod scenario;
