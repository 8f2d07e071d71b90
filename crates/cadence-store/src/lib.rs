//! `cadence-store` — durable job storage and the cross-instance lease claim.
//!
//! # Overview
//!
//! Jobs and their execution history live in SQLite. Runner instances share
//! one database file; [`JobStore::get_jobs_to_run`] selects due, unleased
//! jobs and stamps a lease on them inside a single `BEGIN IMMEDIATE`
//! transaction, so two instances never claim the same row at once. A crashed
//! instance's leases simply expire and the jobs become claimable again.
//!
//! # Tables
//!
//! | Table            | Contents                                          |
//! |------------------|---------------------------------------------------|
//! | `jobs`           | Definitions, schedule state, lease columns        |
//! | `job_executions` | Append-only execution audit records               |

pub mod db;
pub mod error;
mod rows;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqliteJobStore;
pub use store::JobStore;
