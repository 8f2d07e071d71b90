use std::sync::Arc;

use cadence_core::{Job, JobCreate, JobExecution, JobUpdate, NewJobExecution};
use cadence_store::{JobStore, StoreError};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;

/// Outcome of one executor run, as the runner observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` on success.
    pub error: Option<String>,
    /// Attempts the executor used, first try included.
    pub attempts: u32,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct JobService {
    store: Arc<dyn JobStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn create_job(&self, create: JobCreate) -> Result<Job> {
        let now = Utc::now();
        let job = create.into_job(now);
        job.validate(now)?;
        self.store.create_job(&job)?;
        info!(job_id = %job.id, job_type = %job.job_type, next_run = ?job.next_run, "job created");
        Ok(job)
    }

    pub fn get_job(&self, id: Uuid) -> Result<Job> {
        Ok(self.store.get_job(id)?)
    }

    pub fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<Job> {
        let now = Utc::now();
        let mut job = self.store.get_job(id)?;
        job.apply_update(update, now);
        job.validate(now)?;
        self.store.update_job(&job)?;
        info!(job_id = %id, next_run = ?job.next_run, "job updated");
        Ok(job)
    }

    pub fn delete_job(&self, id: Uuid) -> Result<()> {
        self.store.delete_job(id)?;
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    pub fn list_jobs(&self, limit: u32, offset: u32, tags: &[String]) -> Result<Vec<Job>> {
        Ok(self.store.list_jobs(limit, offset, tags)?)
    }

    pub fn get_jobs_to_run(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: usize,
    ) -> Result<Vec<Job>> {
        debug!(instance_id, limit, %now, %lease_until, "polling for due jobs");
        Ok(self.store.get_jobs_to_run(now, lease_until, instance_id, limit)?)
    }

    /// Record the end of a run: advance the schedule, release the lease and
    /// append the execution to the job's history.
    ///
    /// A job deleted mid-run still gets its audit record.
    pub fn finish_job_execution(
        &self,
        job: &Job,
        report: &ExecutionReport,
    ) -> Result<JobExecution> {
        let mut finished = job.clone();
        finished.set_next_run_time(report.finished_at);

        match self.store.finish_job(job.id, finished.next_run) {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                warn!(job_id = %job.id, "job deleted while running, recording execution only");
            }
            Err(e) => return Err(e.into()),
        }

        let execution = self.store.create_job_execution(&NewJobExecution {
            job_id: job.id,
            start_time: report.started_at,
            end_time: report.finished_at,
            number_of_retries: report.attempts.saturating_sub(1),
            error_message: report.error.clone(),
        })?;

        match &report.error {
            None => info!(
                job_id = %job.id,
                next_run = ?finished.next_run,
                "job execution finished"
            ),
            Some(err) => warn!(
                job_id = %job.id,
                attempts = report.attempts,
                err = %err,
                next_run = ?finished.next_run,
                "job execution failed"
            ),
        }
        Ok(execution)
    }

    pub fn get_job_executions(
        &self,
        id: Uuid,
        failed_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<JobExecution>> {
        Ok(self.store.get_job_executions(id, failed_only, limit, offset)?)
    }
}
