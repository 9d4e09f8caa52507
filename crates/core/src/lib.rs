//! `brainflow-core`: workflow foundation building blocks.
//!
//! This crate contains **pure** primitives for the content workflow (no IO,
//! no queues, no locking). Infrastructure lives in `brainflow-infra`.

pub mod content;
pub mod entity;
pub mod error;
pub mod feedback;
pub mod id;
pub mod workflow;

pub use content::{ContentItem, ContentMetadata, ContentStatus, Priority, ProcessingStep};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use feedback::{FEEDBACK_EDIT_WINDOW_HOURS, Feedback};
pub use id::{ContentId, FeedbackId, OutputId, UserId};
pub use workflow::Transition;
