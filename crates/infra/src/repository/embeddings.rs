use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brainflow_core::ContentId;

use super::RepositoryError;

/// A persisted vector for one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub content_id: ContentId,
    pub model: String,
    /// Hash of the text that was embedded; a changed text needs a new vector.
    pub content_hash: String,
    pub vector: Vec<f32>,
    pub embedded_at: DateTime<Utc>,
}

/// Vector storage, one row per content item.
pub trait EmbeddingStore: Send + Sync {
    fn get(&self, content_id: ContentId) -> Result<Option<StoredEmbedding>, RepositoryError>;
    fn put(&self, embedding: StoredEmbedding) -> Result<(), RepositoryError>;
}

impl<S> EmbeddingStore for Arc<S>
where
    S: EmbeddingStore + ?Sized,
{
    fn get(&self, content_id: ContentId) -> Result<Option<StoredEmbedding>, RepositoryError> {
        (**self).get(content_id)
    }

    fn put(&self, embedding: StoredEmbedding) -> Result<(), RepositoryError> {
        (**self).put(embedding)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEmbeddingStore {
    inner: RwLock<HashMap<ContentId, StoredEmbedding>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn get(&self, content_id: ContentId) -> Result<Option<StoredEmbedding>, RepositoryError> {
        let map = self
            .inner
            .read()
            .map_err(|_| RepositoryError::Storage("embedding store lock poisoned".to_string()))?;
        Ok(map.get(&content_id).cloned())
    }

    fn put(&self, embedding: StoredEmbedding) -> Result<(), RepositoryError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| RepositoryError::Storage("embedding store lock poisoned".to_string()))?;
        map.insert(embedding.content_id, embedding);
        Ok(())
    }
}
