use std::collections::BTreeSet;
use std::sync::Arc;

use cadence_core::{AesGcmEncryptor, Auth, HttpJob, JobCreate, JobStatus, JobType, JobUpdate};
use cadence_service::{ErrorKind, ExecutionReport, JobService};
use cadence_store::SqliteJobStore;
use chrono::{Duration, Timelike, Utc};
use rusqlite::Connection;

fn service() -> JobService {
    let enc = Arc::new(AesGcmEncryptor::new(b"testkey123456789").unwrap());
    let store = SqliteJobStore::new(Connection::open_in_memory().unwrap(), enc).unwrap();
    JobService::new(Arc::new(store))
}

fn http() -> HttpJob {
    HttpJob {
        url: "localhost:3000/hook".to_string(),
        method: "POST".to_string(),
        auth: Auth::bearer("tok"),
        ..HttpJob::default()
    }
}

fn one_off(execute_at: chrono::DateTime<Utc>) -> JobCreate {
    JobCreate {
        job_type: JobType::Http,
        execute_at: Some(execute_at),
        cron_schedule: None,
        http_job: Some(http()),
        amqp_job: None,
        tags: BTreeSet::new(),
        allowed_failed_runs: None,
    }
}

fn cron(expression: &str) -> JobCreate {
    JobCreate {
        execute_at: None,
        cron_schedule: Some(expression.to_string()),
        ..one_off(Utc::now())
    }
}

fn report(at: chrono::DateTime<Utc>, error: Option<&str>, attempts: u32) -> ExecutionReport {
    ExecutionReport {
        started_at: at,
        finished_at: at + Duration::seconds(1),
        error: error.map(String::from),
        attempts,
    }
}

#[test]
fn one_off_job_runs_once() {
    let svc = service();
    let due = Utc::now() + Duration::hours(1);
    let job = svc.create_job(one_off(due)).unwrap();
    assert_eq!(job.next_run, Some(due));

    let poll = due + Duration::seconds(1);
    let claimed = svc
        .get_jobs_to_run(poll, poll + Duration::minutes(1), "instance1", 10)
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].http_job.as_ref().unwrap().auth.bearer_token.as_deref(), Some("tok"));

    let execution = svc.finish_job_execution(&claimed[0], &report(poll, None, 1)).unwrap();
    assert!(execution.success);
    assert_eq!(execution.number_of_retries, 0);

    let stored = svc.get_job(job.id).unwrap();
    assert_eq!(stored.next_run, None);
    assert_eq!(stored.number_of_runs, 1);

    let later = poll + Duration::days(1);
    assert!(svc
        .get_jobs_to_run(later, later + Duration::minutes(1), "instance1", 10)
        .unwrap()
        .is_empty());
}

#[test]
fn cron_job_advances_past_each_run() {
    let svc = service();
    let job = svc.create_job(cron("* * * * *")).unwrap();
    let first = job.next_run.unwrap();
    assert_eq!(first.second(), 0);
    assert!(first > job.created_at);

    let claimed = svc
        .get_jobs_to_run(first, first + Duration::minutes(1), "instance1", 10)
        .unwrap();
    assert_eq!(claimed.len(), 1);

    svc.finish_job_execution(&claimed[0], &report(first, Some("connection refused"), 3))
        .unwrap();

    let stored = svc.get_job(job.id).unwrap();
    let second = stored.next_run.unwrap();
    assert!(second > first);
    assert_eq!(second, first + Duration::minutes(1));
    assert_eq!(stored.number_of_runs, 1);

    // Not due again until the next minute.
    assert!(svc
        .get_jobs_to_run(first + Duration::seconds(5), second, "instance1", 10)
        .unwrap()
        .is_empty());
    let again = svc
        .get_jobs_to_run(second, second + Duration::minutes(1), "instance1", 10)
        .unwrap();
    assert_eq!(again.len(), 1);

    let failed = svc.get_job_executions(job.id, true, 10, 0).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message.as_deref(), Some("connection refused"));
    assert_eq!(failed[0].number_of_retries, 2);
}

#[test]
fn invalid_jobs_are_rejected() {
    let svc = service();
    let past = svc.create_job(one_off(Utc::now() - Duration::hours(1))).unwrap_err();
    assert_eq!(past.kind(), ErrorKind::Validation);

    let both = JobCreate {
        cron_schedule: Some("* * * * *".to_string()),
        ..one_off(Utc::now() + Duration::hours(1))
    };
    assert_eq!(svc.create_job(both).unwrap_err().status_code(), 400);

    assert_eq!(svc.create_job(cron("not a cron")).unwrap_err().kind(), ErrorKind::Validation);
    assert!(svc.list_jobs(10, 0, &[]).unwrap().is_empty());
}

#[test]
fn update_recomputes_schedule() {
    let svc = service();
    let job = svc.create_job(one_off(Utc::now() + Duration::hours(1))).unwrap();

    let updated = svc
        .update_job(
            job.id,
            JobUpdate {
                cron_schedule: Some("0 0 * * *".to_string()),
                ..JobUpdate::default()
            },
        )
        .unwrap_err();
    // Both schedule kinds set at once.
    assert_eq!(updated.kind(), ErrorKind::Validation);

    let paused = svc
        .update_job(
            job.id,
            JobUpdate {
                status: Some(JobStatus::Stopped),
                ..JobUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(paused.status, JobStatus::Stopped);
    assert_eq!(svc.get_job(job.id).unwrap().status, JobStatus::Stopped);
}

#[test]
fn missing_job_is_not_found() {
    let svc = service();
    let err = svc.get_job(uuid::Uuid::new_v4()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = svc.update_job(uuid::Uuid::new_v4(), JobUpdate::default()).unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn deleted_job_keeps_its_execution_record() {
    let svc = service();
    let due = Utc::now() + Duration::hours(1);
    let job = svc.create_job(one_off(due)).unwrap();
    let claimed = svc
        .get_jobs_to_run(due, due + Duration::minutes(1), "instance1", 1)
        .unwrap();

    svc.delete_job(job.id).unwrap();
    svc.finish_job_execution(&claimed[0], &report(due, None, 1)).unwrap();

    assert_eq!(svc.get_job(job.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(svc.get_job_executions(job.id, false, 10, 0).unwrap().len(), 1);
}
