use cadence_core::ValidationError;
use cadence_store::StoreError;
use thiserror::Error;

/// Coarse category of a [`ServiceError`], for callers mapping to transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// True for errors the caller caused and must fix before retrying.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateId { .. } => Self::Conflict(e.to_string()),
            StoreError::NotFound { .. } => Self::NotFound(e.to_string()),
            other => Self::Internal(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
