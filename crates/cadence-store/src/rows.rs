use std::collections::BTreeSet;

use cadence_core::{AmqpJob, AuthType, Encryptor, HttpJob, Job, JobExecution, JobStatus, JobType};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub(crate) const JOB_COLUMNS: &str = "id, type, status, execute_at, cron_schedule, http_job, \
     amqp_job, created_at, updated_at, next_run, number_of_runs, allowed_failed_runs, tags";

pub(crate) const EXECUTION_COLUMNS: &str =
    "id, job_id, status, start_time, end_time, error_message, number_of_retries";

pub(crate) const STATUS_SUCCESSFUL: &str = "SUCCESSFUL";
pub(crate) const STATUS_FAILED: &str = "FAILED";

/// Fixed-width UTC timestamps so that text comparison in SQL matches time order.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("bad job id {s:?}: {e}")))
}

/// A `jobs` row as stored: every column in its SQLite text/integer form.
pub(crate) struct JobRow {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub execute_at: Option<String>,
    pub cron_schedule: Option<String>,
    pub http_job: Option<String>,
    pub amqp_job: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub next_run: Option<String>,
    pub number_of_runs: u32,
    pub allowed_failed_runs: Option<u32>,
    pub tags: String,
}

impl JobRow {
    /// Column order follows [`JOB_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_type: row.get(1)?,
            status: row.get(2)?,
            execute_at: row.get(3)?,
            cron_schedule: row.get(4)?,
            http_job: row.get(5)?,
            amqp_job: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            next_run: row.get(9)?,
            number_of_runs: row.get(10)?,
            allowed_failed_runs: row.get(11)?,
            tags: row.get(12)?,
        })
    }

    pub fn encode(job: &Job, encryptor: &dyn Encryptor) -> Result<Self> {
        let http_job = job
            .http_job
            .as_ref()
            .map(|http_job| encrypt_http(http_job, encryptor))
            .transpose()?
            .map(|http_job| serde_json::to_string(&http_job))
            .transpose()?;
        let amqp_job = job
            .amqp_job
            .as_ref()
            .map(|amqp_job| encrypt_amqp(amqp_job, encryptor))
            .transpose()?
            .map(|amqp_job| serde_json::to_string(&amqp_job))
            .transpose()?;

        Ok(Self {
            id: job.id.to_string(),
            job_type: job.job_type.to_string(),
            status: job.status.to_string(),
            execute_at: job.execute_at.as_ref().map(fmt_ts),
            cron_schedule: job.cron_schedule.clone(),
            http_job,
            amqp_job,
            created_at: fmt_ts(&job.created_at),
            updated_at: fmt_ts(&job.updated_at),
            next_run: job.next_run.as_ref().map(fmt_ts),
            number_of_runs: job.number_of_runs,
            allowed_failed_runs: job.allowed_failed_runs,
            tags: serde_json::to_string(&job.tags)?,
        })
    }

    pub fn decode(self, encryptor: &dyn Encryptor) -> Result<Job> {
        let job_type = self
            .job_type
            .parse::<JobType>()
            .map_err(|_| StoreError::Corrupt(format!("unknown job type {:?}", self.job_type)))?;
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|_| StoreError::Corrupt(format!("unknown job status {:?}", self.status)))?;

        let http_job = self
            .http_job
            .as_deref()
            .map(serde_json::from_str::<HttpJob>)
            .transpose()?
            .map(|http_job| decrypt_http(http_job, encryptor))
            .transpose()?;
        let amqp_job = self
            .amqp_job
            .as_deref()
            .map(serde_json::from_str::<AmqpJob>)
            .transpose()?
            .map(|amqp_job| decrypt_amqp(amqp_job, encryptor))
            .transpose()?;
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags)?;

        Ok(Job {
            id: parse_uuid(&self.id)?,
            job_type,
            status,
            execute_at: parse_opt_ts(self.execute_at)?,
            cron_schedule: self.cron_schedule,
            http_job,
            amqp_job,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            next_run: parse_opt_ts(self.next_run)?,
            number_of_runs: self.number_of_runs,
            allowed_failed_runs: self.allowed_failed_runs,
            tags,
        })
    }
}

/// Encrypt only the secrets the auth type actually uses.
fn encrypt_http(http_job: &HttpJob, encryptor: &dyn Encryptor) -> Result<HttpJob> {
    let mut out = http_job.clone();
    let auth = &mut out.auth;
    match auth.auth_type {
        AuthType::None => {}
        AuthType::Basic => {
            auth.username = auth.username.as_deref().map(|v| encryptor.encrypt(v)).transpose()?;
            auth.password = auth.password.as_deref().map(|v| encryptor.encrypt(v)).transpose()?;
        }
        AuthType::Bearer => {
            auth.bearer_token = auth
                .bearer_token
                .as_deref()
                .map(|v| encryptor.encrypt(v))
                .transpose()?;
        }
    }
    Ok(out)
}

fn decrypt_http(mut http_job: HttpJob, encryptor: &dyn Encryptor) -> Result<HttpJob> {
    let auth = &mut http_job.auth;
    match auth.auth_type {
        AuthType::None => {}
        AuthType::Basic => {
            auth.username = auth.username.as_deref().map(|v| encryptor.decrypt(v)).transpose()?;
            auth.password = auth.password.as_deref().map(|v| encryptor.decrypt(v)).transpose()?;
        }
        AuthType::Bearer => {
            auth.bearer_token = auth
                .bearer_token
                .as_deref()
                .map(|v| encryptor.decrypt(v))
                .transpose()?;
        }
    }
    Ok(http_job)
}

/// The whole connection URL is sealed since it embeds broker credentials.
fn encrypt_amqp(amqp_job: &AmqpJob, encryptor: &dyn Encryptor) -> Result<AmqpJob> {
    let mut out = amqp_job.clone();
    out.connection = encryptor.encrypt(&amqp_job.connection)?;
    Ok(out)
}

fn decrypt_amqp(mut amqp_job: AmqpJob, encryptor: &dyn Encryptor) -> Result<AmqpJob> {
    amqp_job.connection = encryptor.decrypt(&amqp_job.connection)?;
    Ok(amqp_job)
}

/// Column order follows [`EXECUTION_COLUMNS`].
pub(crate) fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        id: row.get(0)?,
        job_id: row.get(1)?,
        status: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        error_message: row.get(5)?,
        number_of_retries: row.get(6)?,
    })
}

pub(crate) struct ExecutionRow {
    pub id: i64,
    pub job_id: String,
    pub status: String,
    pub start_time: String,
    pub end_time: String,
    pub error_message: Option<String>,
    pub number_of_retries: u32,
}

impl ExecutionRow {
    pub fn decode(self) -> Result<JobExecution> {
        Ok(JobExecution {
            id: self.id,
            job_id: parse_uuid(&self.job_id)?,
            start_time: parse_ts(&self.start_time)?,
            end_time: parse_ts(&self.end_time)?,
            success: self.status == STATUS_SUCCESSFUL,
            number_of_retries: self.number_of_retries,
            error_message: self.error_message,
        })
    }
}
