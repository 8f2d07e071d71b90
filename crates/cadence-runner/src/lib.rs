//! `cadence-runner` — the per-instance polling loop.
//!
//! Each tick claims as many due jobs as there are free worker slots, runs
//! them concurrently, and records every outcome through the job service.
//! Instances coordinate only through the store's lease claim.

pub mod metrics;
pub mod runner;

pub use crate::metrics::{InFlight, RunnerMetrics};
pub use crate::runner::{Runner, RunnerConfig, RunnerError};
