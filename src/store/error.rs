use thiserror::Error;

use crate::model::JobId;
use crate::trigger::CronParseError;

/// Failure modes for Job Store operations (§4.2, §7).
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("conflicting session_target and payload: {0}")]
    ConflictingTargetAndPayload(String),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<CronParseError> for JobStoreError {
    fn from(e: CronParseError) -> Self {
        JobStoreError::InvalidSchedule(e.to_string())
    }
}

impl From<std::io::Error> for JobStoreError {
    fn from(e: std::io::Error) -> Self {
        JobStoreError::StorageUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for JobStoreError {
    fn from(e: serde_json::Error) -> Self {
        JobStoreError::StorageUnavailable(e.to_string())
    }
}
