use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of one execution of a job (all retries included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: i64,
    pub job_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub number_of_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Fields supplied when recording an execution; the store assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJobExecution {
    pub job_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub number_of_retries: u32,
    /// `None` on success.
    pub error_message: Option<String>,
}

impl NewJobExecution {
    pub fn success(&self) -> bool {
        self.error_message.is_none()
    }
}
