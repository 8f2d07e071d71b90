use cadence_core::JobType;
use thiserror::Error;

/// Errors raised while building or running an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The job carries no payload for its declared type.
    #[error("unsupported job type: {0}")]
    UnsupportedJobType(JobType),

    /// The stored definition cannot be turned into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response code: {status}")]
    InvalidResponseCode { status: u16 },

    #[error("invalid body encoding: {0}")]
    InvalidBodyEncoding(String),

    #[error("body decode error: {0}")]
    BodyDecode(#[from] base64::DecodeError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker negatively acknowledged the publish.
    #[error("publish not confirmed by broker")]
    PublishRejected,
}
