//! Persistence collaborators used by the workflow.
//!
//! Only single-row atomic writes are assumed. The scheduler keeps writes to a
//! content item single-writer through the duplicate-work guard, so no
//! multi-row transactions are needed.

pub mod embeddings;
pub mod entity_store;
pub mod learning;

use std::sync::Arc;

use brainflow_core::{ContentId, ContentItem, Feedback, FeedbackId};

pub use embeddings::{EmbeddingStore, InMemoryEmbeddingStore, StoredEmbedding};
pub use entity_store::InMemoryEntityStore;
pub use learning::{InMemoryLearningSink, LearningSink, LearningUpdate};

pub type InMemoryContentRepository = InMemoryEntityStore<ContentItem>;
pub type InMemoryFeedbackRepository = InMemoryEntityStore<Feedback>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub trait ContentRepository: Send + Sync {
    fn insert(&self, item: ContentItem) -> Result<(), RepositoryError>;
    fn get(&self, id: ContentId) -> Result<Option<ContentItem>, RepositoryError>;
    /// Overwrite an existing item (status + metadata in one write).
    fn save(&self, item: &ContentItem) -> Result<(), RepositoryError>;
}

pub trait FeedbackRepository: Send + Sync {
    fn insert(&self, feedback: Feedback) -> Result<(), RepositoryError>;
    fn get(&self, id: FeedbackId) -> Result<Option<Feedback>, RepositoryError>;
    fn save(&self, feedback: &Feedback) -> Result<(), RepositoryError>;
}

impl ContentRepository for InMemoryContentRepository {
    fn insert(&self, item: ContentItem) -> Result<(), RepositoryError> {
        self.insert_new(item)
    }

    fn get(&self, id: ContentId) -> Result<Option<ContentItem>, RepositoryError> {
        self.find(id)
    }

    fn save(&self, item: &ContentItem) -> Result<(), RepositoryError> {
        self.replace(item)
    }
}

impl FeedbackRepository for InMemoryFeedbackRepository {
    fn insert(&self, feedback: Feedback) -> Result<(), RepositoryError> {
        self.insert_new(feedback)
    }

    fn get(&self, id: FeedbackId) -> Result<Option<Feedback>, RepositoryError> {
        self.find(id)
    }

    fn save(&self, feedback: &Feedback) -> Result<(), RepositoryError> {
        self.replace(feedback)
    }
}

impl<R> ContentRepository for Arc<R>
where
    R: ContentRepository + ?Sized,
{
    fn insert(&self, item: ContentItem) -> Result<(), RepositoryError> {
        (**self).insert(item)
    }

    fn get(&self, id: ContentId) -> Result<Option<ContentItem>, RepositoryError> {
        (**self).get(id)
    }

    fn save(&self, item: &ContentItem) -> Result<(), RepositoryError> {
        (**self).save(item)
    }
}

impl<R> FeedbackRepository for Arc<R>
where
    R: FeedbackRepository + ?Sized,
{
    fn insert(&self, feedback: Feedback) -> Result<(), RepositoryError> {
        (**self).insert(feedback)
    }

    fn get(&self, id: FeedbackId) -> Result<Option<Feedback>, RepositoryError> {
        (**self).get(id)
    }

    fn save(&self, feedback: &Feedback) -> Result<(), RepositoryError> {
        (**self).save(feedback)
    }
}
