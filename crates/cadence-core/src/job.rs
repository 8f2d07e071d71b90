use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    amqp_job::AmqpJob,
    error::ValidationError,
    http_job::HttpJob,
    schedule::{next_occurrence, parse_cron},
};

/// Which side effect a job performs. The set is closed: adding a kind means
/// adding a variant here and a factory arm in `cadence-executor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "AMQP")]
    Amqp,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Http => "HTTP",
            JobType::Amqp => "AMQP",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP" => Ok(JobType::Http),
            "AMQP" => Ok(JobType::Amqp),
            _ => Err(ValidationError::InvalidJobType),
        }
    }
}

/// Operator-controlled state. Only `Running` jobs are ever claimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    #[default]
    Running,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(JobStatus::Running),
            "STOPPED" => Ok(JobStatus::Stopped),
            _ => Err(ValidationError::InvalidJobStatus),
        }
    }
}

/// A persisted job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,

    /// Set for one-off jobs.
    pub execute_at: Option<DateTime<Utc>>,
    /// Set for recurring jobs (standard five-field cron).
    pub cron_schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_job: Option<HttpJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp_job: Option<AmqpJob>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// When the job is due next. `None` only once a one-off job has run.
    pub next_run: Option<DateTime<Utc>>,
    #[serde(rename = "num_runs", default)]
    pub number_of_runs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_failed_runs: Option<u32>,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Job {
    /// Check every structural invariant. `now` bounds `execute_at`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.id.is_nil() {
            return Err(ValidationError::InvalidJobId);
        }

        match self.job_type {
            JobType::Http => {
                self.http_job
                    .as_ref()
                    .ok_or(ValidationError::HttpJobNotDefined)?
                    .validate()?;
                if self.amqp_job.is_some() {
                    return Err(ValidationError::InvalidJobFields);
                }
            }
            JobType::Amqp => {
                self.amqp_job
                    .as_ref()
                    .ok_or(ValidationError::AmqpJobNotDefined)?
                    .validate()?;
                if self.http_job.is_some() {
                    return Err(ValidationError::InvalidJobFields);
                }
            }
        }

        match (&self.execute_at, &self.cron_schedule) {
            (Some(execute_at), None) => {
                if *execute_at < now {
                    return Err(ValidationError::InvalidExecuteAt);
                }
            }
            (None, Some(expression)) => {
                parse_cron(expression)?;
            }
            _ => return Err(ValidationError::InvalidJobSchedule),
        }

        Ok(())
    }

    pub fn is_recurring(&self) -> bool {
        self.cron_schedule.is_some()
    }

    /// Schedule rule for a freshly created or updated job: a cron job waits
    /// for its next occurrence, a one-off job waits for `execute_at`.
    pub fn set_initial_run_time(&mut self, now: DateTime<Utc>) {
        self.next_run = match (&self.cron_schedule, self.execute_at) {
            (Some(expression), _) => next_occurrence(expression, now),
            (None, execute_at) => execute_at,
        };
    }

    /// Schedule rule after an execution: a cron job advances strictly past
    /// `now`, a one-off job becomes terminal.
    pub fn set_next_run_time(&mut self, now: DateTime<Utc>) {
        self.next_run = match &self.cron_schedule {
            Some(expression) => next_occurrence(expression, now),
            None => None,
        };
        self.updated_at = now;
    }

    /// Merge a partial update. The caller must re-validate afterwards.
    pub fn apply_update(&mut self, update: JobUpdate, now: DateTime<Utc>) {
        if let Some(job_type) = update.job_type {
            self.job_type = job_type;
        }
        if let Some(http) = update.http {
            self.http_job = Some(http);
            self.amqp_job = None;
        }
        if let Some(amqp) = update.amqp {
            self.amqp_job = Some(amqp);
            self.http_job = None;
        }
        if let Some(cron_schedule) = update.cron_schedule {
            self.cron_schedule = Some(cron_schedule);
        }
        if let Some(execute_at) = update.execute_at {
            self.execute_at = Some(execute_at);
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = now;
        self.set_initial_run_time(now);
    }

    /// Copy safe to hand to clients: HTTP secrets and AMQP user info removed.
    pub fn without_credentials(&self) -> Job {
        let mut job = self.clone();
        if let Some(http_job) = job.http_job.as_mut() {
            http_job.remove_credentials();
        }
        if let Some(amqp_job) = job.amqp_job.as_mut() {
            amqp_job.remove_credentials();
        }
        job
    }
}

/// Client request to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreate {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub execute_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cron_schedule: Option<String>,
    #[serde(default)]
    pub http_job: Option<HttpJob>,
    #[serde(default)]
    pub amqp_job: Option<AmqpJob>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub allowed_failed_runs: Option<u32>,
}

impl JobCreate {
    /// Build an unvalidated job with a fresh ID and its initial run time.
    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        let mut job = Job {
            id: Uuid::new_v4(),
            job_type: self.job_type,
            status: JobStatus::Running,
            execute_at: self.execute_at,
            cron_schedule: self.cron_schedule,
            http_job: self.http_job,
            amqp_job: self.amqp_job,
            created_at: now,
            updated_at: now,
            next_run: None,
            number_of_runs: 0,
            allowed_failed_runs: self.allowed_failed_runs,
            tags: self.tags,
        };
        job.set_initial_run_time(now);
        job
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp: Option<AmqpJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}
