//! `cadence-executor` — turns a claimed job into an outbound HTTP call or
//! AMQP publish.
//!
//! # Overview
//!
//! | Type                      | Role                                            |
//! |---------------------------|-------------------------------------------------|
//! | [`Executor`]              | One job execution; reports attempts used        |
//! | [`HttpExecutor`]          | Sends the job's request through an [`HttpClient`] |
//! | [`AmqpExecutor`]          | Publishes the job's message through a [`Broker`]  |
//! | [`RetryExecutor`]         | Decorator retrying with capped exponential backoff |
//! | [`DefaultExecutorFactory`] | Picks the executor by job type, applies decorators |

pub mod amqp;
pub mod error;
pub mod executor;
pub mod factory;
pub mod http;
pub mod retry;

pub use amqp::{AmqpExecutor, AmqpMessage, Broker, LapinBroker};
pub use error::ExecutorError;
pub use executor::{Decorator, Executor};
pub use factory::{DefaultExecutorFactory, ExecutorFactory};
pub use http::{HttpClient, HttpExecutor};
pub use retry::{RetryExecutor, RetryPolicy};
