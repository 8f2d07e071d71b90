use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{
    AesGcmEncryptor, HttpJob, Job, JobCreate, JobExecution, JobType, NewJobExecution,
};
use cadence_executor::{Decorator, Executor, ExecutorError, ExecutorFactory, RetryPolicy};
use cadence_runner::{Runner, RunnerConfig, RunnerError, RunnerMetrics};
use cadence_service::JobService;
use cadence_store::{JobStore, SqliteJobStore};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tempfile::TempDir;
use uuid::Uuid;

/// Shared bookkeeping for every executor the fake factory builds.
#[derive(Default)]
struct Tally {
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Clone, Copy)]
enum Behavior {
    Sleep(Duration),
    /// The first call panics, later calls succeed.
    PanicOnce,
    /// The first `n` calls fail, later calls succeed.
    FailFirst(usize),
}

struct FakeExecutor {
    tally: Arc<Tally>,
    behavior: Behavior,
}

#[async_trait]
impl Executor for FakeExecutor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn execute(&self, _job: &Job) -> Result<(), ExecutorError> {
        let call = self.tally.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior {
            Behavior::Sleep(delay) => {
                let now = self.tally.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.tally.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.tally.running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            Behavior::PanicOnce if call == 1 => panic!("executor blew up"),
            Behavior::PanicOnce => Ok(()),
            Behavior::FailFirst(n) if call <= n => {
                Err(ExecutorError::InvalidResponseCode { status: 503 })
            }
            Behavior::FailFirst(_) => Ok(()),
        }
    }
}

struct FakeFactory {
    tally: Arc<Tally>,
    behavior: Behavior,
}

impl ExecutorFactory for FakeFactory {
    fn new_executor(
        &self,
        _job: &Job,
        decorators: &[Arc<dyn Decorator>],
    ) -> Result<Box<dyn Executor>, ExecutorError> {
        let mut executor: Box<dyn Executor> = Box::new(FakeExecutor {
            tally: self.tally.clone(),
            behavior: self.behavior,
        });
        for decorator in decorators {
            executor = decorator.decorate(executor);
        }
        Ok(executor)
    }
}

/// Delegates to SQLite but stalls inside every claim, like a claimer
/// waiting out `busy_timeout`. Remembers the last lease it handed out.
struct SlowClaimStore {
    inner: SqliteJobStore,
    stall: Duration,
    last_lease: Mutex<Option<DateTime<Utc>>>,
}

impl JobStore for SlowClaimStore {
    fn create_job(&self, job: &Job) -> cadence_store::Result<()> {
        self.inner.create_job(job)
    }

    fn get_job(&self, id: Uuid) -> cadence_store::Result<Job> {
        self.inner.get_job(id)
    }

    fn update_job(&self, job: &Job) -> cadence_store::Result<()> {
        self.inner.update_job(job)
    }

    fn delete_job(&self, id: Uuid) -> cadence_store::Result<()> {
        self.inner.delete_job(id)
    }

    fn list_jobs(
        &self,
        limit: u32,
        offset: u32,
        tags: &[String],
    ) -> cadence_store::Result<Vec<Job>> {
        self.inner.list_jobs(limit, offset, tags)
    }

    fn get_jobs_to_run(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        instance_id: &str,
        limit: usize,
    ) -> cadence_store::Result<Vec<Job>> {
        std::thread::sleep(self.stall);
        let jobs = self.inner.get_jobs_to_run(now, lease_until, instance_id, limit)?;
        if !jobs.is_empty() {
            *self.last_lease.lock().unwrap() = Some(lease_until);
        }
        Ok(jobs)
    }

    fn finish_job(&self, id: Uuid, next_run: Option<DateTime<Utc>>) -> cadence_store::Result<()> {
        self.inner.finish_job(id, next_run)
    }

    fn create_job_execution(
        &self,
        execution: &NewJobExecution,
    ) -> cadence_store::Result<JobExecution> {
        self.inner.create_job_execution(execution)
    }

    fn get_job_executions(
        &self,
        job_id: Uuid,
        failed_only: bool,
        limit: u32,
        offset: u32,
    ) -> cadence_store::Result<Vec<JobExecution>> {
        self.inner.get_job_executions(job_id, failed_only, limit, offset)
    }
}

fn encryptor() -> Arc<AesGcmEncryptor> {
    Arc::new(AesGcmEncryptor::new(b"testkey123456789").unwrap())
}

fn service() -> Arc<JobService> {
    let store = SqliteJobStore::new(Connection::open_in_memory().unwrap(), encryptor()).unwrap();
    Arc::new(JobService::new(Arc::new(store)))
}

fn config(max_concurrent_jobs: usize) -> RunnerConfig {
    RunnerConfig {
        instance_id: "instance1".to_string(),
        interval: Duration::from_millis(20),
        max_concurrent_jobs,
        job_lock_duration: Duration::from_secs(30),
    }
}

fn runner_with(
    service: &Arc<JobService>,
    config: RunnerConfig,
    behavior: Behavior,
    decorators: Vec<Arc<dyn Decorator>>,
) -> (Runner, Arc<Tally>) {
    let tally = Arc::new(Tally::default());
    let factory = Arc::new(FakeFactory {
        tally: tally.clone(),
        behavior,
    });
    let metrics = Arc::new(RunnerMetrics::new(config.instance_id.clone(), true));
    let runner = Runner::new(config, service.clone(), factory, decorators, metrics).unwrap();
    (runner, tally)
}

fn runner(
    service: &Arc<JobService>,
    config: RunnerConfig,
    delay: Duration,
) -> (Runner, Arc<Tally>) {
    runner_with(service, config, Behavior::Sleep(delay), Vec::new())
}

fn add_due_job(service: &JobService) -> Uuid {
    let job = service
        .create_job(JobCreate {
            job_type: JobType::Http,
            execute_at: Some(Utc::now() + chrono::Duration::milliseconds(50)),
            cron_schedule: None,
            http_job: Some(HttpJob {
                url: "localhost:3000".to_string(),
                method: "GET".to_string(),
                ..HttpJob::default()
            }),
            amqp_job: None,
            tags: BTreeSet::new(),
            allowed_failed_runs: None,
        })
        .unwrap();
    job.id
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..250 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

fn executions(service: &JobService, id: Uuid) -> usize {
    service.get_job_executions(id, false, 100, 0).unwrap().len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_off_job_runs_exactly_once() {
    let service = service();
    let id = add_due_job(&service);
    let (runner, tally) = runner(&service, config(4), Duration::ZERO);
    runner.start();

    wait_until(|| executions(&service, id) == 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(runner.stop(Duration::from_secs(2)).await);

    assert_eq!(tally.calls.load(Ordering::SeqCst), 1);
    assert_eq!(executions(&service, id), 1);
    let job = service.get_job(id).unwrap();
    assert_eq!(job.next_run, None);
    assert_eq!(job.number_of_runs, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrency_is_capped_by_worker_slots() {
    let service = service();
    let ids: Vec<_> = (0..6).map(|_| add_due_job(&service)).collect();
    let (runner, tally) = runner(&service, config(2), Duration::from_millis(150));
    runner.start();

    wait_until(|| ids.iter().all(|id| executions(&service, *id) == 1)).await;
    assert!(runner.stop(Duration::from_secs(2)).await);

    assert_eq!(tally.calls.load(Ordering::SeqCst), 6);
    assert!(tally.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_executor_frees_its_slot() {
    let service = service();
    let ids = [add_due_job(&service), add_due_job(&service)];
    let (runner, tally) = runner_with(&service, config(1), Behavior::PanicOnce, Vec::new());
    runner.start();

    // The panicked job keeps its lease; the other one needs the freed slot.
    wait_until(|| ids.iter().map(|id| executions(&service, *id)).sum::<usize>() == 1).await;
    assert!(runner.stop(Duration::from_secs(2)).await);
    assert_eq!(tally.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn execution_is_cut_off_when_the_lease_ends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cadence.db");
    let store = SqliteJobStore::open(&path, Duration::from_secs(5), encryptor()).unwrap();
    let service = Arc::new(JobService::new(Arc::new(store)));
    let id = add_due_job(&service);

    let lease = RunnerConfig {
        job_lock_duration: Duration::from_millis(200),
        ..config(1)
    };
    let started = std::time::Instant::now();
    let (runner, tally) = runner(&service, lease, Duration::from_secs(30));
    runner.start();

    wait_until(|| executions(&service, id) == 1).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(runner.stop(Duration::from_secs(2)).await);
    assert_eq!(tally.calls.load(Ordering::SeqCst), 1);

    let history = service.get_job_executions(id, false, 10, 0).unwrap();
    assert!(!history[0].success);
    assert!(history[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));

    let raw = Connection::open(&path).unwrap();
    let (locked_by, locked_until): (Option<String>, Option<String>) = raw
        .query_row(
            "SELECT locked_by, locked_until FROM jobs WHERE id = ?1",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(locked_by, None);
    assert_eq!(locked_until, None);
    assert_eq!(service.get_job(id).unwrap().next_run, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_claim_does_not_extend_execution_past_the_lease() {
    let store = Arc::new(SlowClaimStore {
        inner: SqliteJobStore::new(Connection::open_in_memory().unwrap(), encryptor()).unwrap(),
        stall: Duration::from_millis(400),
        last_lease: Mutex::new(None),
    });
    let service = Arc::new(JobService::new(store.clone()));
    let id = add_due_job(&service);

    let lease = RunnerConfig {
        job_lock_duration: Duration::from_millis(500),
        ..config(1)
    };
    let (runner, _) = runner(&service, lease, Duration::from_secs(30));
    runner.start();

    wait_until(|| executions(&service, id) == 1).await;
    assert!(runner.stop(Duration::from_secs(2)).await);

    let lease_until = store.last_lease.lock().unwrap().unwrap();
    let history = service.get_job_executions(id, false, 10, 0).unwrap();
    let overrun = history[0].end_time - lease_until;
    assert!(
        overrun < chrono::Duration::milliseconds(100),
        "execution ended {}ms after its lease",
        overrun.num_milliseconds()
    );
    assert!(!history[0].success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_are_recorded_in_history() {
    let service = service();
    let id = add_due_job(&service);
    let retry: Arc<dyn Decorator> = Arc::new(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    });
    let (runner, tally) = runner_with(&service, config(1), Behavior::FailFirst(2), vec![retry]);
    runner.start();

    wait_until(|| executions(&service, id) == 1).await;
    assert!(runner.stop(Duration::from_secs(2)).await);

    assert_eq!(tally.calls.load(Ordering::SeqCst), 3);
    let history = service.get_job_executions(id, false, 10, 0).unwrap();
    assert!(history[0].success);
    assert_eq!(history[0].number_of_retries, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_drains_in_flight_jobs() {
    let service = service();
    let id = add_due_job(&service);
    let (runner, tally) = runner(&service, config(4), Duration::from_millis(300));
    runner.start();

    wait_until(|| tally.running.load(Ordering::SeqCst) == 1).await;
    assert!(runner.stop(Duration::from_secs(5)).await);
    assert_eq!(executions(&service, id), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_gives_up_after_grace_period() {
    let service = service();
    let id = add_due_job(&service);
    let (runner, tally) = runner(&service, config(4), Duration::from_secs(30));
    runner.start();

    wait_until(|| tally.running.load(Ordering::SeqCst) == 1).await;
    assert!(!runner.stop(Duration::from_millis(100)).await);
    assert_eq!(executions(&service, id), 0);
}

#[tokio::test]
async fn stop_without_start_is_harmless() {
    let service = service();
    let (runner, _) = runner(&service, config(1), Duration::ZERO);
    assert!(runner.stop(Duration::from_millis(10)).await);
}

#[test]
fn zero_settings_are_rejected() {
    let service = service();
    let factory = Arc::new(FakeFactory {
        tally: Arc::new(Tally::default()),
        behavior: Behavior::Sleep(Duration::ZERO),
    });
    let metrics = Arc::new(RunnerMetrics::disabled());

    for bad in [
        RunnerConfig {
            interval: Duration::ZERO,
            ..config(1)
        },
        RunnerConfig {
            job_lock_duration: Duration::ZERO,
            ..config(1)
        },
        config(0),
    ] {
        let result =
            Runner::new(bad, service.clone(), factory.clone(), Vec::new(), metrics.clone());
        assert!(matches!(result, Err(RunnerError::InvalidConfig(_))));
    }
}
