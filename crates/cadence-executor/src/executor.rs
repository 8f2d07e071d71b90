use async_trait::async_trait;
use cadence_core::Job;

use crate::error::ExecutorError;

/// Runs one job against its external target.
///
/// An executor instance is built per execution, so implementations may keep
/// per-run state such as the attempt counter.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, job: &Job) -> Result<(), ExecutorError>;

    /// Attempts consumed by the last `execute` call.
    fn attempts(&self) -> u32 {
        1
    }
}

/// Wraps an executor with extra behaviour (retries, instrumentation).
pub trait Decorator: Send + Sync {
    fn decorate(&self, inner: Box<dyn Executor>) -> Box<dyn Executor>;
}
