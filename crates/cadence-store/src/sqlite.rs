use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cadence_core::{Encryptor, Job, JobExecution, NewJobExecution};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, TransactionBehavior,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{self, init_db};
use crate::error::{Result, StoreError};
use crate::rows::{
    execution_from_row, fmt_ts, JobRow, EXECUTION_COLUMNS, JOB_COLUMNS, STATUS_FAILED,
    STATUS_SUCCESSFUL,
};
use crate::store::JobStore;

/// SQLite-backed [`JobStore`].
///
/// One connection per store, guarded by a mutex. Several processes may open
/// the same file; the claim's `BEGIN IMMEDIATE` serialises them.
pub struct SqliteJobStore {
    db: Mutex<Connection>,
    encryptor: Arc<dyn Encryptor>,
}

impl SqliteJobStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            encryptor,
        })
    }

    pub fn open(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
        encryptor: Arc<dyn Encryptor>,
    ) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = db::open(&path.to_string_lossy(), busy_timeout)?;
        Self::new(conn, encryptor)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decode(&self, row: JobRow) -> Result<Job> {
        row.decode(self.encryptor.as_ref())
    }

    /// Decode a batch, dropping rows that fail so one bad job cannot stall the rest.
    fn decode_all(&self, rows: Vec<JobRow>) -> Vec<Job> {
        rows.into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match self.decode(row) {
                    Ok(job) => Some(job),
                    Err(e) => {
                        warn!(job_id = %id, error = %e, "skipping undecodable job row");
                        None
                    }
                }
            })
            .collect()
    }
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, job: &Job) -> Result<()> {
        let row = JobRow::encode(job, self.encryptor.as_ref())?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO jobs
             (id, type, status, execute_at, cron_schedule, http_job, amqp_job,
              created_at, updated_at, next_run, number_of_runs, allowed_failed_runs, tags)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                row.id,
                row.job_type,
                row.status,
                row.execute_at,
                row.cron_schedule,
                row.http_job,
                row.amqp_job,
                row.created_at,
                row.updated_at,
                row.next_run,
                row.number_of_runs,
                row.allowed_failed_runs,
                row.tags,
            ],
        );
        match inserted {
            Ok(_) => {
                debug!(job_id = %job.id, job_type = %job.job_type, "job stored");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateId { id: job.id })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_job(&self, id: Uuid) -> Result<Job> {
        let row = {
            let conn = self.conn();
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id.to_string()],
                JobRow::from_row,
            )
            .optional()?
        };
        match row {
            Some(row) => self.decode(row),
            None => Err(StoreError::NotFound { id }),
        }
    }

    fn update_job(&self, job: &Job) -> Result<()> {
        let row = JobRow::encode(job, self.encryptor.as_ref())?;
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE jobs SET
                type = ?2, status = ?3, execute_at = ?4, cron_schedule = ?5,
                http_job = ?6, amqp_job = ?7, updated_at = ?8, next_run = ?9,
                allowed_failed_runs = ?10, tags = ?11
             WHERE id = ?1",
            params![
                row.id,
                row.job_type,
                row.status,
                row.execute_at,
                row.cron_schedule,
                row.http_job,
                row.amqp_job,
                row.updated_at,
                row.next_run,
                row.allowed_failed_runs,
                row.tags,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id: job.id });
        }
        Ok(())
    }

    fn delete_job(&self, id: Uuid) -> Result<()> {
        let conn = self.conn();
        let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [id.to_string()])?;
        debug!(job_id = %id, deleted = n, "job delete");
        Ok(())
    }

    fn list_jobs(&self, limit: u32, offset: u32, tags: &[String]) -> Result<Vec<Job>> {
        let mut sql = format!("SELECT {JOB_COLUMNS} FROM jobs");
        let mut args: Vec<Value> = Vec::with_capacity(tags.len() + 2);
        for (i, tag) in tags.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!(
                "EXISTS (SELECT 1 FROM json_each(jobs.tags) WHERE json_each.value = ?{})",
                i + 1
            ));
            args.push(Value::Text(tag.clone()));
        }
        sql.push_str(&format!(
            " ORDER BY created_at, id LIMIT ?{} OFFSET ?{}",
            tags.len() + 1,
            tags.len() + 2
        ));
        args.push(Value::Integer(i64::from(limit)));
        args.push(Value::Integer(i64::from(offset)));

        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), JobRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(self.decode_all(rows))
    }

    fn get_jobs_to_run(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: usize,
    ) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now_str = fmt_ts(&now);
        let lease_str = fmt_ts(&lease_until);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let jobs = {
            let mut conn = self.conn();
            // IMMEDIATE takes the write lock up front: a second claimer blocks
            // on busy_timeout until this transaction commits.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let rows = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE status = 'RUNNING'
                       AND next_run IS NOT NULL
                       AND next_run <= ?1
                       AND (locked_until IS NULL OR locked_until < ?1)
                     ORDER BY next_run, id
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![now_str, limit], JobRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            // Undecodable rows stay unleased.
            let jobs = self.decode_all(rows);
            {
                let mut lease = tx.prepare(
                    "UPDATE jobs SET locked_until = ?2, locked_by = ?3 WHERE id = ?1",
                )?;
                for job in &jobs {
                    lease.execute(params![job.id.to_string(), lease_str, instance_id])?;
                }
            }
            tx.commit()?;
            jobs
        };

        if !jobs.is_empty() {
            debug!(instance_id, claimed = jobs.len(), "claimed due jobs");
        }
        Ok(jobs)
    }

    fn finish_job(&self, id: Uuid, next_run: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE jobs SET
                next_run = ?2, locked_until = NULL, locked_by = NULL,
                number_of_runs = number_of_runs + 1, updated_at = ?3
             WHERE id = ?1",
            params![
                id.to_string(),
                next_run.as_ref().map(fmt_ts),
                fmt_ts(&Utc::now())
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    fn create_job_execution(&self, execution: &NewJobExecution) -> Result<JobExecution> {
        let status = if execution.success() {
            STATUS_SUCCESSFUL
        } else {
            STATUS_FAILED
        };
        let conn = self.conn();
        conn.execute(
            "INSERT INTO job_executions
             (job_id, status, start_time, end_time, error_message, number_of_retries, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                execution.job_id.to_string(),
                status,
                fmt_ts(&execution.start_time),
                fmt_ts(&execution.end_time),
                execution.error_message,
                execution.number_of_retries,
                fmt_ts(&Utc::now()),
            ],
        )?;
        Ok(JobExecution {
            id: conn.last_insert_rowid(),
            job_id: execution.job_id,
            start_time: execution.start_time,
            end_time: execution.end_time,
            success: execution.success(),
            number_of_retries: execution.number_of_retries,
            error_message: execution.error_message.clone(),
        })
    }

    fn get_job_executions(
        &self,
        job_id: Uuid,
        failed_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<JobExecution>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM job_executions
                 WHERE job_id = ?1 AND (?2 = 0 OR status = '{STATUS_FAILED}')
                 ORDER BY start_time DESC, id DESC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt
                .query_map(
                    params![job_id.to_string(), failed_only, limit, offset],
                    execution_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(|row| row.decode()).collect()
    }
}
