use cadence_core::CryptoError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur within the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A job with this ID is already stored.
    #[error("Job already exists: {id}")]
    DuplicateId { id: Uuid },

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    NotFound { id: Uuid },

    /// Credential encryption or decryption failed.
    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// A payload column could not be (de)serialised.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row violates the schema's expectations.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
