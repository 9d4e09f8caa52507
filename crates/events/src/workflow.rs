use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brainflow_core::{ContentId, ContentStatus};

/// Progress notification for a content item's workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub content_id: Option<ContentId>,
    pub occurred_at: DateTime<Utc>,
    pub kind: WorkflowEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEventKind {
    StatusChanged {
        from: ContentStatus,
        to: ContentStatus,
    },
    JobEnqueued {
        job_id: Uuid,
        job_type: String,
        lane: String,
    },
    JobDeadLettered {
        job_id: Uuid,
        reason: String,
    },
    DuplicateSkipped {
        job_id: Uuid,
        stage: String,
    },
}

impl WorkflowEvent {
    pub fn new(content_id: Option<ContentId>, kind: WorkflowEventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            content_id,
            occurred_at,
            kind,
        }
    }

    pub fn status_changed(
        content_id: ContentId,
        from: ContentStatus,
        to: ContentStatus,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(Some(content_id), WorkflowEventKind::StatusChanged { from, to }, occurred_at)
    }

    /// Stable event name (e.g. "workflow.status_changed").
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            WorkflowEventKind::StatusChanged { .. } => "workflow.status_changed",
            WorkflowEventKind::JobEnqueued { .. } => "workflow.job_enqueued",
            WorkflowEventKind::JobDeadLettered { .. } => "workflow.job_dead_lettered",
            WorkflowEventKind::DuplicateSkipped { .. } => "workflow.duplicate_skipped",
        }
    }
}
