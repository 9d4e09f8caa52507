//! EmbeddingGeneration: one provider call per batch, one stored vector per item.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use brainflow_ai::Embedder;
use brainflow_core::ContentItem;

use crate::jobs::JobType;
use crate::records::content_hash;
use crate::repository::{EmbeddingStore, StoredEmbedding};

use super::error::WorkflowError;
use super::executor::{ExecutionContext, ExecutionResult, StageExecutor};

pub struct EmbeddingExecutor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn EmbeddingStore>,
}

impl EmbeddingExecutor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self { embedder, store }
    }

    fn is_current(&self, item: &ContentItem, hash: &str) -> Result<bool, WorkflowError> {
        Ok(self
            .store
            .get(item.id)?
            .is_some_and(|stored| stored.content_hash == hash && stored.model == self.embedder.model()))
    }
}

impl StageExecutor for EmbeddingExecutor {
    fn job_type(&self) -> JobType {
        JobType::EmbeddingGeneration
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError> {
        let mut pending: Vec<(&ContentItem, String)> = Vec::new();
        let mut skipped = Vec::new();

        for item in ctx.items() {
            let hash = content_hash(&item.raw_text);
            if self.is_current(item, &hash)? {
                skipped.push(item.id);
            } else {
                pending.push((item, hash));
            }
        }

        let texts: Vec<&str> = pending.iter().map(|(item, _)| item.raw_text.as_str()).collect();
        let results = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts)
        };

        if results.len() != pending.len() {
            return Err(WorkflowError::Transient(format!(
                "embedder returned {} results for {} texts",
                results.len(),
                pending.len()
            )));
        }

        let mut embedded = Vec::new();
        let mut failed = Vec::new();
        let mut transient = 0usize;

        for ((item, hash), result) in pending.into_iter().zip(results) {
            match result {
                Ok(vector) => {
                    self.store.put(StoredEmbedding {
                        content_id: item.id,
                        model: self.embedder.model().to_string(),
                        content_hash: hash,
                        vector,
                        embedded_at: ctx.now(),
                    })?;
                    embedded.push(item.id);
                }
                Err(err) => {
                    warn!(content_id = %item.id, error = %err, "embedding failed for item");
                    if err.is_transient() {
                        transient += 1;
                    }
                    failed.push(json!({"content_id": item.id, "error": err.to_string()}));
                }
            }
        }

        debug!(
            job_id = %ctx.job().id,
            embedded = embedded.len(),
            skipped = skipped.len(),
            failed = failed.len(),
            "embedding batch processed"
        );

        // Stored vectors survive the retry; the next run skips them by hash.
        if transient > 0 {
            return Err(WorkflowError::Transient(format!(
                "{transient} of {} embeddings failed transiently",
                ctx.items().len()
            )));
        }

        Ok(ExecutionResult::new()
            .with_output("embedded", json!(embedded))
            .with_output("skipped", json!(skipped))
            .with_output("failed", json!(failed)))
    }
}
