//! `cadence-service` — job lifecycle rules on top of a [`JobStore`].
//!
//! Validation, initial and next run computation, and execution bookkeeping
//! live here so the API layer and the runner share one set of rules.
//!
//! [`JobStore`]: cadence_store::JobStore

pub mod error;
pub mod service;

pub use error::{ErrorKind, ServiceError};
pub use service::{ExecutionReport, JobService};
