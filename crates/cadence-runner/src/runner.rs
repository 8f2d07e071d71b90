use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cadence_core::config::RunnerSection;
use cadence_core::Job;
use cadence_executor::{Decorator, ExecutorFactory};
use cadence_service::{ExecutionReport, JobService};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::RunnerMetrics;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid runner config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub instance_id: String,
    pub interval: Duration,
    pub max_concurrent_jobs: usize,
    /// Lease length. Execution is cut off when the lease runs out.
    pub job_lock_duration: Duration,
}

impl From<&RunnerSection> for RunnerConfig {
    fn from(section: &RunnerSection) -> Self {
        Self {
            instance_id: section.instance_id.clone(),
            interval: section.interval(),
            max_concurrent_jobs: section.max_concurrent_jobs,
            job_lock_duration: section.job_lock_duration(),
        }
    }
}

struct Shared {
    config: RunnerConfig,
    lease: chrono::Duration,
    service: Arc<JobService>,
    factory: Arc<dyn ExecutorFactory>,
    decorators: Vec<Arc<dyn Decorator>>,
    metrics: Arc<RunnerMetrics>,
    slots: Arc<Semaphore>,
}

/// Polls the store on a fixed interval and executes claimed jobs on a
/// bounded worker pool.
///
/// `start` spawns the loop; `stop` cancels it and drains in-flight workers.
pub struct Runner {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Runner {
    pub fn new(
        config: RunnerConfig,
        service: Arc<JobService>,
        factory: Arc<dyn ExecutorFactory>,
        decorators: Vec<Arc<dyn Decorator>>,
        metrics: Arc<RunnerMetrics>,
    ) -> Result<Self, RunnerError> {
        if config.interval.is_zero() {
            return Err(RunnerError::InvalidConfig("interval must be greater than zero".into()));
        }
        if config.job_lock_duration.is_zero() {
            return Err(RunnerError::InvalidConfig(
                "job lock duration must be greater than zero".into(),
            ));
        }
        if config.max_concurrent_jobs == 0 {
            return Err(RunnerError::InvalidConfig(
                "max concurrent jobs must be greater than zero".into(),
            ));
        }
        let lease = chrono::Duration::from_std(config.job_lock_duration)
            .map_err(|e| RunnerError::InvalidConfig(format!("job lock duration: {e}")))?;

        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                lease,
                service,
                factory,
                decorators,
                metrics,
                slots,
            }),
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.config.instance_id
    }

    /// Spawn the polling loop. A second call while running is ignored.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            warn!(instance_id = %self.instance_id(), "runner already started");
            return;
        }
        info!(
            instance_id = %self.instance_id(),
            interval_ms = self.shared.config.interval.as_millis() as u64,
            max_concurrent_jobs = self.shared.config.max_concurrent_jobs,
            "runner starting"
        );
        let shared = Arc::clone(&self.shared);
        let shutdown = self.shutdown.clone();
        *handle = Some(tokio::spawn(run_loop(shared, shutdown)));
    }

    /// Stop polling and wait up to `grace` for in-flight jobs.
    ///
    /// Returns `false` if the grace period ran out; the remaining workers
    /// are aborted and their leases left to expire.
    pub async fn stop(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return true;
        };

        match timeout(grace, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(instance_id = %self.instance_id(), err = %e, "runner loop ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    instance_id = %self.instance_id(),
                    grace_ms = grace.as_millis() as u64,
                    "grace period expired, aborting in-flight jobs"
                );
                handle.abort();
                false
            }
        }
    }
}

async fn run_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut ticker = interval(shared.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut workers: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(result) = workers.join_next(), if !workers.is_empty() => reap(result),
            _ = ticker.tick() => shared.tick(&mut workers).await,
        }
    }

    info!(
        instance_id = %shared.config.instance_id,
        in_flight = workers.len(),
        "runner stopping, draining workers"
    );
    while let Some(result) = workers.join_next().await {
        reap(result);
    }
    info!(instance_id = %shared.config.instance_id, "runner stopped");
}

fn reap(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(err = %e, "job worker panicked"),
        Err(e) => debug!(err = %e, "job worker cancelled"),
    }
}

impl Shared {
    async fn tick(self: &Arc<Self>, workers: &mut JoinSet<()>) {
        let capacity = self.slots.available_permits();
        if capacity == 0 {
            debug!(instance_id = %self.config.instance_id, "all worker slots busy, skipping poll");
            return;
        }

        // The same lease on the monotonic clock, so workers stop when it ends.
        let deadline = Instant::now() + self.config.job_lock_duration;
        let now = Utc::now();
        let lease_until = now + self.lease;
        let service = Arc::clone(&self.service);
        let instance_id = self.config.instance_id.clone();
        let claimed = tokio::task::spawn_blocking(move || {
            service.get_jobs_to_run(now, lease_until, &instance_id, capacity)
        })
        .await;

        let jobs = match claimed {
            Ok(Ok(jobs)) => jobs,
            Ok(Err(e)) => {
                error!(instance_id = %self.config.instance_id, err = %e, "failed to claim jobs");
                return;
            }
            Err(e) => {
                error!(instance_id = %self.config.instance_id, err = %e, "claim task failed");
                return;
            }
        };
        if jobs.is_empty() {
            return;
        }
        debug!(instance_id = %self.config.instance_id, claimed = jobs.len(), "dispatching jobs");

        for job in jobs {
            // Only this task takes permits, so `capacity` are still free.
            let permit = match Arc::clone(&self.slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %job.id, "no free worker slot, lease will expire");
                    continue;
                }
            };
            self.metrics.job_claimed(job.job_type);
            let shared = Arc::clone(self);
            workers.spawn(async move { shared.run_job(job, deadline, permit).await });
        }
    }

    async fn run_job(self: Arc<Self>, job: Job, deadline: Instant, _permit: OwnedSemaphorePermit) {
        let _in_flight = self.metrics.track_in_flight();
        let started_at = Utc::now();
        let clock = Instant::now();

        let (error, attempts) = match self.factory.new_executor(&job, &self.decorators) {
            Err(e) => (Some(e.to_string()), 1),
            Ok(executor) => {
                debug!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    executor = executor.name(),
                    "executing job"
                );
                let outcome = timeout_at(deadline, executor.execute(&job)).await;
                let error = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(_) => Some(format!(
                        "execution timed out: lease of {}s expired",
                        self.config.job_lock_duration.as_secs_f64()
                    )),
                };
                (error, executor.attempts())
            }
        };

        let finished_at = Utc::now();
        self.metrics
            .job_finished(job.job_type, error.is_none(), attempts, clock.elapsed());

        let report = ExecutionReport {
            started_at,
            finished_at,
            error,
            attempts,
        };
        let service = Arc::clone(&self.service);
        let job_id = job.id;
        let recorded =
            tokio::task::spawn_blocking(move || service.finish_job_execution(&job, &report)).await;
        match recorded {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(%job_id, err = %e, "failed to record job execution"),
            Err(e) => error!(%job_id, err = %e, "record task failed"),
        }
    }
}
