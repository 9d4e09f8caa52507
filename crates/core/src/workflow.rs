//! Workflow state machine for content items.
//!
//! ```text
//! pending ──begin──▶ processing ──complete──▶ processed
//!    │                   │
//!    └──────fail─────────┴──────fail────────▶ failed
//! ```
//!
//! Every function here is pure: it inspects an item and returns the next
//! `Transition`. The caller persists it with a single write, which keeps the
//! item's status and metadata consistent with each other.

use chrono::{DateTime, Utc};

use crate::content::{ContentItem, ContentMetadata, ContentStatus, ProcessingStep};
use crate::error::{DomainError, DomainResult};

/// New status + metadata for a content item.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub status: ContentStatus,
    pub metadata: ContentMetadata,
    pub at: DateTime<Utc>,
}

impl ContentItem {
    /// Write a transition computed by this module.
    pub fn apply(&mut self, transition: Transition) {
        self.status = transition.status;
        self.metadata = transition.metadata;
        self.updated_at = transition.at;
    }
}

fn ensure_not_terminal(item: &ContentItem, to: ContentStatus) -> DomainResult<()> {
    if item.status.is_terminal() {
        return Err(DomainError::invalid_transition(item.status, to));
    }
    Ok(())
}

fn advance(metadata: &mut ContentMetadata, step: ProcessingStep, now: DateTime<Utc>) {
    // Checkpoints only move forward; a redelivered job must not rewind progress.
    if !step.is_reached_by(metadata.processing_step) {
        metadata.processing_step = Some(step);
    }
    metadata.last_checkpoint = Some(now);
}

/// `pending -> processing` on first pickup.
///
/// `processing -> processing` is accepted too: it is what a redelivered or
/// resumed job looks like, and the existing checkpoint is kept.
pub fn begin(item: &ContentItem, step: ProcessingStep, now: DateTime<Utc>) -> DomainResult<Transition> {
    ensure_not_terminal(item, ContentStatus::Processing)?;

    let mut metadata = item.metadata.clone();
    advance(&mut metadata, step, now);

    Ok(Transition {
        status: ContentStatus::Processing,
        metadata,
        at: now,
    })
}

/// Record a completed sub-step while processing.
pub fn checkpoint(
    item: &ContentItem,
    step: ProcessingStep,
    now: DateTime<Utc>,
) -> DomainResult<Transition> {
    if item.status != ContentStatus::Processing {
        return Err(DomainError::invalid_transition(item.status, ContentStatus::Processing));
    }

    let mut metadata = item.metadata.clone();
    advance(&mut metadata, step, now);

    Ok(Transition {
        status: ContentStatus::Processing,
        metadata,
        at: now,
    })
}

/// `processing -> processed`.
pub fn complete(item: &ContentItem, now: DateTime<Utc>) -> DomainResult<Transition> {
    if item.status != ContentStatus::Processing {
        return Err(DomainError::invalid_transition(item.status, ContentStatus::Processed));
    }

    let mut metadata = item.metadata.clone();
    advance(&mut metadata, ProcessingStep::Completed, now);
    metadata.failure_reason = None;

    Ok(Transition {
        status: ContentStatus::Processed,
        metadata,
        at: now,
    })
}

/// `pending | processing -> failed`.
///
/// The checkpoint is left as-is so an explicit redispatch can resume.
pub fn fail(item: &ContentItem, reason: impl Into<String>, now: DateTime<Utc>) -> DomainResult<Transition> {
    ensure_not_terminal(item, ContentStatus::Failed)?;

    let mut metadata = item.metadata.clone();
    metadata.failure_reason = Some(reason.into());

    Ok(Transition {
        status: ContentStatus::Failed,
        metadata,
        at: now,
    })
}
