use cadence_core::{Job, JobExecution, NewJobExecution};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

/// Durable job storage shared by the API and every runner instance.
///
/// Each method is one short transaction. Implementations must make
/// [`get_jobs_to_run`](JobStore::get_jobs_to_run) atomic across processes:
/// that claim is the only mutual exclusion between instances.
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `DuplicateId` if the ID is taken.
    fn create_job(&self, job: &Job) -> Result<()>;

    fn get_job(&self, id: Uuid) -> Result<Job>;

    /// Overwrite a job's definition and schedule state. Lease columns and
    /// the run counter are left alone. Fails with `NotFound`.
    fn update_job(&self, job: &Job) -> Result<()>;

    /// Idempotent: deleting a missing job succeeds.
    fn delete_job(&self, id: Uuid) -> Result<()>;

    /// Page through jobs by creation time. A non-empty `tags` keeps only jobs
    /// carrying every listed tag.
    fn list_jobs(&self, limit: u32, offset: u32, tags: &[String]) -> Result<Vec<Job>>;

    /// Claim up to `limit` due jobs for `instance_id` until `lease_until`.
    ///
    /// A job is due when `next_run <= now` and its lease is absent or has
    /// expired (`locked_until < now`). Oldest-due jobs are claimed first.
    fn get_jobs_to_run(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: usize,
    ) -> Result<Vec<Job>>;

    /// Release the lease, store `next_run` (`None` ends a one-off job) and
    /// count the run. Fails with `NotFound` if the job was deleted.
    fn finish_job(&self, id: Uuid, next_run: Option<DateTime<Utc>>) -> Result<()>;

    fn create_job_execution(&self, execution: &NewJobExecution) -> Result<JobExecution>;

    /// Execution history for one job, newest first.
    fn get_job_executions(
        &self,
        job_id: Uuid,
        failed_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<JobExecution>>;
}
