use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Result of a text generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub text: String,

    /// Confidence in \[0, 1\] (provider convention; not enforced).
    pub confidence: f64,

    /// Free-form metadata (model name, token counts, timings, etc).
    pub metadata: JsonValue,
}

impl AiResponse {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Classified provider error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AiError {
    /// Transient errors are worth retrying; everything else is fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AiError::RateLimited { .. } | AiError::Timeout(_) | AiError::Network(_)
        )
    }

    /// Stable short name, used in audit records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AiError::RateLimited { .. } => "rate_limited",
            AiError::Timeout(_) => "timeout",
            AiError::Network(_) => "network",
            AiError::InvalidRequest(_) => "invalid_request",
            AiError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(AiError::RateLimited { retry_after: None }.is_transient());
        assert!(AiError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(AiError::Network("connection reset".into()).is_transient());
        assert!(!AiError::InvalidRequest("prompt too long".into()).is_transient());
        assert!(!AiError::Internal("bug".into()).is_transient());
    }
}
