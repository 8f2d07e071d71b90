use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::Job;
use tracing::{info, warn};

use crate::error::ExecutorError;
use crate::executor::{Decorator, Executor};

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based): `base · 2^(attempt-1)`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Decorator for RetryPolicy {
    fn decorate(&self, inner: Box<dyn Executor>) -> Box<dyn Executor> {
        Box::new(RetryExecutor::new(inner, *self))
    }
}

pub struct RetryExecutor {
    inner: Box<dyn Executor>,
    policy: RetryPolicy,
    attempts: AtomicU32,
}

impl RetryExecutor {
    pub fn new(inner: Box<dyn Executor>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Executor for RetryExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, job: &Job) -> Result<(), ExecutorError> {
        let max_attempts = self.policy.max_attempts.max(1);
        self.attempts.store(0, Ordering::Relaxed);

        let mut attempt = 1;
        loop {
            self.attempts.store(attempt, Ordering::Relaxed);
            match self.inner.execute(job).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            job_id = %job.id,
                            executor = self.inner.name(),
                            attempt,
                            "job succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        job_id = %job.id,
                        executor = self.inner.name(),
                        attempt,
                        err = %e,
                        delay_ms = delay.as_millis() as u64,
                        "job attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}
