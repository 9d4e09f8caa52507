use thiserror::Error;

use brainflow_ai::AiError;
use brainflow_core::{ContentId, DomainError};

use crate::jobs::{JobQueueError, JobType, UnknownLane};
use crate::lease::LeaseError;
use crate::records::RecordStoreError;
use crate::repository::RepositoryError;

/// Every failure a stage or the scheduler can produce.
///
/// Retry decisions are made only through [`WorkflowError::is_retryable`].
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// Bad input (e.g. empty content). Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Classified provider failure; retryable when the provider error is transient.
    #[error("provider error: {0}")]
    Provider(#[from] AiError),

    /// Partial or infrastructural failure worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Last transient failure once the retry policy is used up.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),

    /// Downstream work was requested for an item that already failed.
    #[error("content item {0} has failed; redispatch it explicitly")]
    ContentFailed(ContentId),

    #[error(transparent)]
    UnknownLane(#[from] UnknownLane),

    #[error("no executor registered for {0}")]
    NoExecutor(JobType),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Provider(err) => err.is_transient(),
            WorkflowError::Transient(_) | WorkflowError::Storage(_) => true,
            _ => false,
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => WorkflowError::NotFound(what),
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

impl From<JobQueueError> for WorkflowError {
    fn from(err: JobQueueError) -> Self {
        match err {
            JobQueueError::NotFound(id) => WorkflowError::NotFound(format!("job {id}")),
            other => WorkflowError::Storage(other.to_string()),
        }
    }
}

impl From<RecordStoreError> for WorkflowError {
    fn from(err: RecordStoreError) -> Self {
        WorkflowError::Storage(err.to_string())
    }
}

impl From<LeaseError> for WorkflowError {
    fn from(err: LeaseError) -> Self {
        WorkflowError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn classifies_retryable_errors() {
        assert!(WorkflowError::from(AiError::Timeout(Duration::from_secs(60))).is_retryable());
        assert!(WorkflowError::from(AiError::RateLimited { retry_after: None }).is_retryable());
        assert!(WorkflowError::Transient("1 of 3 embeddings failed".into()).is_retryable());

        assert!(!WorkflowError::from(AiError::InvalidRequest("bad prompt".into())).is_retryable());
        assert!(!WorkflowError::validation("content is empty").is_retryable());
        assert!(
            !WorkflowError::RetryExhausted {
                attempts: 3,
                last_error: "timeout".into()
            }
            .is_retryable()
        );
        assert!(!WorkflowError::ContentFailed(ContentId::new()).is_retryable());
    }

    #[test]
    fn missing_rows_are_not_retried() {
        let err = WorkflowError::from(RepositoryError::NotFound("content x".into()));
        assert!(matches!(err, WorkflowError::NotFound(_)));
        assert!(!err.is_retryable());

        let err = WorkflowError::from(RepositoryError::Storage("connection reset".into()));
        assert!(err.is_retryable());
    }
}
