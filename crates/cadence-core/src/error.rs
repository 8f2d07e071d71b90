use thiserror::Error;

/// A job definition was rejected. Always the caller's fault; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job ID must be a valid, non-nil UUID")]
    InvalidJobId,

    #[error("job type must be either HTTP or AMQP")]
    InvalidJobType,

    #[error("job status must be either RUNNING or STOPPED")]
    InvalidJobStatus,

    #[error("job cannot have both HTTP and AMQP fields defined")]
    InvalidJobFields,

    #[error("job must have exactly one of execute_at and cron_schedule defined")]
    InvalidJobSchedule,

    #[error("invalid cron schedule: {0}")]
    InvalidCronSchedule(String),

    #[error("execute_at must be in the future")]
    InvalidExecuteAt,

    #[error("HTTP job must be defined")]
    HttpJobNotDefined,

    #[error("HTTP job URL cannot be empty")]
    EmptyHttpJobUrl,

    #[error("HTTP job method cannot be empty")]
    EmptyHttpJobMethod,

    #[error("AMQP job must be defined")]
    AmqpJobNotDefined,

    #[error("AMQP connection string is invalid")]
    AmqpConnectionInvalid,

    #[error("exchange must be defined for AMQP jobs")]
    EmptyExchange,

    #[error("routing key must be defined for AMQP jobs")]
    EmptyRoutingKey,

    #[error("invalid body encoding: {0}")]
    InvalidBodyEncoding(String),

    #[error("username must be defined for basic auth")]
    EmptyUsername,

    #[error("password must be defined for basic auth")]
    EmptyPassword,

    #[error("bearer token must be defined for bearer auth")]
    EmptyBearerToken,
}

/// Encryption/decryption failure for credentials at rest.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("encryption key rejected by cipher")]
    InvalidKey,

    #[error("random nonce generation failed")]
    Rng,

    #[error("ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("ciphertext is truncated")]
    Truncated,

    #[error("failed to seal plaintext")]
    Seal,

    #[error("failed to decrypt ciphertext")]
    Open,

    #[error("decrypted value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadenceError {
    /// Short machine-readable error code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Config(_) => "CONFIG_ERROR",
            CadenceError::Validation(_) => "VALIDATION_ERROR",
            CadenceError::Crypto(_) => "CRYPTO_ERROR",
            CadenceError::Serialization(_) => "SERIALIZATION_ERROR",
            CadenceError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
