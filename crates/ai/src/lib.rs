//! `brainflow-ai`
//!
//! **Responsibility:** boundary to the AI provider.
//!
//! The workflow only ever talks to the provider through the narrow traits in
//! this crate:
//! - [`AiClient`] for text generation,
//! - [`Embedder`] for vector embeddings,
//! - [`EntityExtractor`] for brain-dump parsing.
//!
//! Errors are classified here ([`AiError::is_transient`]) so that retry
//! decisions upstream never have to inspect provider-specific messages.

pub mod client;
pub mod deadline;
pub mod embedder;
pub mod extraction;
pub mod result;
pub mod scripted;

pub use client::{AiClient, GenerateOptions};
pub use deadline::DeadlineClient;
pub use embedder::{Embedder, Embedding};
pub use extraction::{EntityExtractor, ExtractedEntities, RuleBasedExtractor};
pub use result::{AiError, AiResponse};
pub use scripted::{HashEmbedder, OfflineAiClient, ScriptedAiClient};
