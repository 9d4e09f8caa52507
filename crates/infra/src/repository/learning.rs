use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use brainflow_core::{ContentId, FeedbackId, OutputId, UserId};

use super::RepositoryError;

/// Corrections distilled from one feedback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningUpdate {
    pub feedback_id: FeedbackId,
    pub user_id: UserId,
    pub content_id: ContentId,
    pub output_id: OutputId,
    pub entities: Vec<JsonValue>,
    pub learned_at: DateTime<Utc>,
}

/// Where corrections go (prompt tuning, per-user dictionaries, ...).
pub trait LearningSink: Send + Sync {
    fn apply(&self, update: LearningUpdate) -> Result<(), RepositoryError>;
}

impl<S> LearningSink for Arc<S>
where
    S: LearningSink + ?Sized,
{
    fn apply(&self, update: LearningUpdate) -> Result<(), RepositoryError> {
        (**self).apply(update)
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLearningSink {
    inner: Mutex<Vec<LearningUpdate>>,
}

impl InMemoryLearningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<LearningUpdate> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl LearningSink for InMemoryLearningSink {
    fn apply(&self, update: LearningUpdate) -> Result<(), RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Storage("learning sink lock poisoned".to_string()))?
            .push(update);
        Ok(())
    }
}
