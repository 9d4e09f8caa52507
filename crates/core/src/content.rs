//! Content items and their workflow metadata.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::entity::Entity;
use crate::error::DomainError;
use crate::id::{ContentId, UserId};

/// Lifecycle status of a content item.
///
/// This is the only workflow state the submitting actor observes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Processing => "processing",
            ContentStatus::Processed => "processed",
            ContentStatus::Failed => "failed",
        }
    }

    /// `processed` and `failed` never transition automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContentStatus::Processed | ContentStatus::Failed)
    }
}

impl core::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable checkpoint marker: the last completed sub-step of a run.
///
/// Variants are declared in execution order; `Ord` follows that order so
/// executors can ask "has this step already happened?".
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Started,
    EntityExtractionCompleted,
    StructuringCompleted,
    Completed,
}

impl ProcessingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStep::Started => "started",
            ProcessingStep::EntityExtractionCompleted => "entity_extraction_completed",
            ProcessingStep::StructuringCompleted => "structuring_completed",
            ProcessingStep::Completed => "completed",
        }
    }

    pub fn is_reached_by(&self, current: Option<ProcessingStep>) -> bool {
        current.is_some_and(|c| c >= *self)
    }
}

impl core::fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority hint supplied at submission time.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Ok(Priority::Normal),
            "urgent" | "high" => Ok(Priority::Urgent),
            other => Err(DomainError::validation(format!("unknown priority: {other}"))),
        }
    }
}

/// Metadata bag attached to a content item.
///
/// The typed fields are the ones the workflow reads; everything else (extracted
/// entities, generated output, ...) goes into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_step: Option<ProcessingStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl ContentMetadata {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.extra.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.extra.insert(key.into(), value);
    }
}

/// A unit of user-submitted content moving through the AI workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub owner: UserId,
    pub raw_text: String,
    pub status: ContentStatus,
    pub metadata: ContentMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// New items always start `pending`.
    pub fn new(owner: UserId, raw_text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ContentId::new(),
            owner,
            raw_text: raw_text.into(),
            status: ContentStatus::Pending,
            metadata: ContentMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = Some(priority);
        self
    }

    pub fn with_metadata(mut self, metadata: ContentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn priority(&self) -> Priority {
        self.metadata.priority.unwrap_or_default()
    }

    pub fn processing_step(&self) -> Option<ProcessingStep> {
        self.metadata.processing_step
    }

    pub fn is_failed(&self) -> bool {
        self.status == ContentStatus::Failed
    }

    /// Explicit redispatch of a failed item (human or upstream caller).
    ///
    /// Checkpoints survive so the next run resumes instead of starting over.
    pub fn reset_for_redispatch(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != ContentStatus::Failed {
            return Err(DomainError::invalid_transition(self.status, ContentStatus::Pending));
        }
        self.status = ContentStatus::Pending;
        self.metadata.failure_reason = None;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for ContentItem {
    type Id = ContentId;

    fn id(&self) -> ContentId {
        self.id
    }
}
