//! `cadence-core` — shared data model for the Cadence job scheduler.
//!
//! # Overview
//!
//! A [`Job`] describes one side effect (an HTTP call or an AMQP publish) and
//! when it should happen. Exactly one of `execute_at` (one-off) or
//! `cron_schedule` (recurring) is set, and exactly one payload matching the
//! job's [`JobType`] is present. Every execution attempt leaves one immutable
//! [`JobExecution`] record behind.
//!
//! | Module        | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | `job`         | `Job`, `JobCreate`, `JobUpdate`, validation           |
//! | `http_job`    | HTTP payload and auth                                 |
//! | `amqp_job`    | AMQP payload and body encoding                        |
//! | `execution`   | Execution audit records                               |
//! | `schedule`    | Cron parsing and next-run computation                 |
//! | `security`    | Symmetric encryption for credentials at rest          |
//! | `config`      | `cadence.toml` + `CADENCE_*` env configuration        |

pub mod amqp_job;
pub mod config;
pub mod error;
pub mod execution;
pub mod http_job;
pub mod job;
pub mod schedule;
pub mod security;

pub use amqp_job::{AmqpJob, BodyEncoding};
pub use error::{CadenceError, CryptoError, Result, ValidationError};
pub use execution::{JobExecution, NewJobExecution};
pub use http_job::{Auth, AuthType, HttpJob};
pub use job::{Job, JobCreate, JobStatus, JobType, JobUpdate};
pub use security::{AesGcmEncryptor, Encryptor};
