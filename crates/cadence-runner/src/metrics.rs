//! Runner metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the embedding process installs a recorder.
//! Every series carries `instance_id`; per-job series also carry `job_type`.

use std::time::Duration;

use cadence_core::JobType;
use metrics::{counter, gauge, histogram, Gauge};

pub const JOBS_TOTAL: &str = "scheduler_runner_jobs_total";
pub const JOBS_EXECUTED: &str = "scheduler_runner_jobs_executed";
pub const JOBS_FAILED: &str = "scheduler_runner_jobs_failed";
pub const JOB_RETRIES: &str = "scheduler_runner_job_retries";
pub const JOB_DURATION: &str = "scheduler_runner_job_duration_seconds";
pub const JOBS_IN_EXECUTION: &str = "scheduler_runner_jobs_in_execution";

/// Every recording method is a no-op when the sink is disabled.
pub struct RunnerMetrics {
    enabled: bool,
    instance_id: String,
}

impl RunnerMetrics {
    pub fn new(instance_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            instance_id: instance_id.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(String::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A job was claimed and handed to a worker.
    pub fn job_claimed(&self, job_type: JobType) {
        if !self.enabled {
            return;
        }
        counter!(
            JOBS_TOTAL,
            "instance_id" => self.instance_id.clone(),
            "job_type" => job_type.as_str()
        )
        .increment(1);
    }

    /// Count the job as in execution until the returned guard drops.
    pub fn track_in_flight(&self) -> InFlight {
        if !self.enabled {
            return InFlight { gauge: None };
        }
        let gauge = gauge!(JOBS_IN_EXECUTION, "instance_id" => self.instance_id.clone());
        gauge.increment(1.0);
        InFlight { gauge: Some(gauge) }
    }

    pub fn job_finished(&self, job_type: JobType, success: bool, attempts: u32, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        let instance_id = self.instance_id.clone();
        let job_type = job_type.as_str();
        let outcome = if success { JOBS_EXECUTED } else { JOBS_FAILED };
        counter!(outcome, "instance_id" => instance_id.clone(), "job_type" => job_type)
            .increment(1);

        let retries = attempts.saturating_sub(1);
        if retries > 0 {
            counter!(JOB_RETRIES, "instance_id" => instance_id.clone(), "job_type" => job_type)
                .increment(u64::from(retries));
        }
        histogram!(JOB_DURATION, "instance_id" => instance_id, "job_type" => job_type)
            .record(elapsed.as_secs_f64());
    }
}

/// Decrements the in-execution gauge on drop, including on panic or abort.
pub struct InFlight {
    gauge: Option<Gauge>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(gauge) = &self.gauge {
            gauge.decrement(1.0);
        }
    }
}
