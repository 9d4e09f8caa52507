//! Domain error model.

use thiserror::Error;

use crate::content::ContentStatus;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures (validation, invalid state
/// transitions, ownership). Queue and provider concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty content).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A workflow transition is not allowed from the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ContentStatus, to: ContentStatus },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. edit window closed).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting user does not own the record.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: ContentStatus, to: ContentStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
