use std::sync::Arc;

use cadence_core::{Job, JobType};

use crate::amqp::{AmqpExecutor, Broker};
use crate::error::ExecutorError;
use crate::executor::{Decorator, Executor};
use crate::http::{HttpClient, HttpExecutor};

/// Builds the executor for one job execution.
pub trait ExecutorFactory: Send + Sync {
    /// Decorators wrap in order: the last one listed is outermost.
    fn new_executor(
        &self,
        job: &Job,
        decorators: &[Arc<dyn Decorator>],
    ) -> Result<Box<dyn Executor>, ExecutorError>;
}

pub struct DefaultExecutorFactory {
    http_client: Arc<dyn HttpClient>,
    broker: Arc<dyn Broker>,
}

impl DefaultExecutorFactory {
    pub fn new(http_client: Arc<dyn HttpClient>, broker: Arc<dyn Broker>) -> Self {
        Self {
            http_client,
            broker,
        }
    }
}

impl ExecutorFactory for DefaultExecutorFactory {
    fn new_executor(
        &self,
        job: &Job,
        decorators: &[Arc<dyn Decorator>],
    ) -> Result<Box<dyn Executor>, ExecutorError> {
        let mut executor: Box<dyn Executor> = match job.job_type {
            JobType::Http if job.http_job.is_some() => {
                Box::new(HttpExecutor::new(self.http_client.clone()))
            }
            JobType::Amqp if job.amqp_job.is_some() => {
                Box::new(AmqpExecutor::new(self.broker.clone()))
            }
            job_type => return Err(ExecutorError::UnsupportedJobType(job_type)),
        };
        for decorator in decorators {
            executor = decorator.decorate(executor);
        }
        Ok(executor)
    }
}
