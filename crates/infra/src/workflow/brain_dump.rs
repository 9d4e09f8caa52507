//! BrainDumpParse: raw notes -> extracted entities -> structured tasks.

use std::sync::Arc;

use tracing::{debug, warn};

use brainflow_ai::{EntityExtractor, ExtractedEntities};
use brainflow_core::{ContentItem, ProcessingStep};

use crate::jobs::{JobPayload, JobType};

use super::error::WorkflowError;
use super::executor::{ExecutionContext, ExecutionResult, JobRequest, StageExecutor};

pub const ENTITIES_KEY: &str = "extracted_entities";
pub const TASKS_KEY: &str = "tasks";

pub struct BrainDumpExecutor {
    extractor: Arc<dyn EntityExtractor>,
}

impl BrainDumpExecutor {
    pub fn new(extractor: Arc<dyn EntityExtractor>) -> Self {
        Self { extractor }
    }

    /// Entities from an earlier run, when the checkpoint says extraction is done.
    ///
    /// The checkpoint alone decides: a missing or unreadable entity value
    /// resumes with no entities rather than extracting again.
    fn resumed_entities(item: &ContentItem) -> Option<ExtractedEntities> {
        if !ProcessingStep::EntityExtractionCompleted.is_reached_by(item.processing_step()) {
            return None;
        }

        let entities = match item.metadata.get(ENTITIES_KEY) {
            Some(stored) => serde_json::from_value(stored.clone()).unwrap_or_else(|err| {
                warn!(content_id = %item.id, error = %err, "unreadable checkpointed entities; resuming without them");
                ExtractedEntities::default()
            }),
            None => {
                warn!(content_id = %item.id, "extraction checkpoint carries no entities; resuming without them");
                ExtractedEntities::default()
            }
        };
        Some(entities)
    }
}

impl StageExecutor for BrainDumpExecutor {
    fn job_type(&self) -> JobType {
        JobType::BrainDumpParse
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError> {
        let item = ctx.item()?.clone();

        if item.raw_text.trim().is_empty() {
            return Err(WorkflowError::validation("content is empty"));
        }

        let entities = match Self::resumed_entities(&item) {
            Some(entities) => {
                debug!(content_id = %item.id, "resuming after entity extraction checkpoint");
                entities
            }
            None => {
                let entities = self.extractor.extract(&item.raw_text)?;
                ctx.checkpoint(
                    item.id,
                    ProcessingStep::EntityExtractionCompleted,
                    [(ENTITIES_KEY.to_string(), to_json(&entities)?)],
                )?;
                entities
            }
        };

        if !ProcessingStep::StructuringCompleted.is_reached_by(ctx.item()?.processing_step()) {
            let tasks = entities.tasks();
            ctx.checkpoint(
                item.id,
                ProcessingStep::StructuringCompleted,
                [(TASKS_KEY.to_string(), to_json(&tasks)?)],
            )?;
        }

        Ok(ExecutionResult::new()
            .with_checkpoint(ProcessingStep::StructuringCompleted)
            .with_next(JobRequest::new(
                JobPayload::embeddings([item.id]),
                item.priority(),
            )))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, WorkflowError> {
    serde_json::to_value(value).map_err(|e| WorkflowError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use brainflow_ai::{AiError, RuleBasedExtractor};
    use brainflow_core::{ContentStatus, UserId};

    use crate::jobs::{Job, Lane};
    use crate::repository::InMemoryContentRepository;

    use super::*;

    #[derive(Default)]
    struct CountingExtractor {
        calls: AtomicUsize,
    }

    impl EntityExtractor for CountingExtractor {
        fn extract(&self, text: &str) -> Result<ExtractedEntities, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            RuleBasedExtractor.extract(text)
        }
    }

    fn processing_item(text: &str) -> ContentItem {
        let mut item = ContentItem::new(UserId::new(), text, Utc::now());
        item.status = ContentStatus::Processing;
        item
    }

    fn run(
        executor: &BrainDumpExecutor,
        repo: &InMemoryContentRepository,
        item: ContentItem,
    ) -> Result<ExecutionResult, WorkflowError> {
        let now = Utc::now();
        let job = Job::new(JobPayload::brain_dump(item.id), Lane::AiProcessing, now);
        let mut ctx = ExecutionContext::new(&job, vec![item], repo, now);
        executor.execute(&mut ctx)
    }

    #[test]
    fn parses_and_emits_one_embedding_job() {
        let repo = InMemoryContentRepository::new();
        let item = processing_item("Meeting about Project Alpha. Action: review API by Friday");
        repo.insert_new(item.clone()).unwrap();

        let executor = BrainDumpExecutor::new(Arc::new(RuleBasedExtractor));
        let result = run(&executor, &repo, item.clone()).unwrap();

        assert_eq!(result.next_jobs.len(), 1);
        assert_eq!(result.next_jobs[0].payload, JobPayload::embeddings([item.id]));

        let stored = repo.find(item.id).unwrap().unwrap();
        assert_eq!(stored.processing_step(), Some(ProcessingStep::StructuringCompleted));
        let entities: ExtractedEntities =
            serde_json::from_value(stored.metadata.get(ENTITIES_KEY).cloned().unwrap()).unwrap();
        assert_eq!(entities.projects, vec!["Project Alpha"]);
        assert_eq!(stored.metadata.get(TASKS_KEY).unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_content_is_a_validation_error() {
        let repo = InMemoryContentRepository::new();
        let item = processing_item("   \n");
        repo.insert_new(item.clone()).unwrap();

        let executor = BrainDumpExecutor::new(Arc::new(RuleBasedExtractor));
        let err = run(&executor, &repo, item).unwrap_err();

        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn resumes_without_redoing_extraction() {
        let repo = InMemoryContentRepository::new();
        let mut item = processing_item("Action: ship it by Monday");
        item.metadata.processing_step = Some(ProcessingStep::EntityExtractionCompleted);
        item.metadata.insert(
            ENTITIES_KEY,
            serde_json::json!({"projects": [], "action_items": ["ship it by Monday"], "deadlines": ["Monday"]}),
        );
        repo.insert_new(item.clone()).unwrap();

        let extractor = Arc::new(CountingExtractor::default());
        let executor = BrainDumpExecutor::new(extractor.clone());
        let result = run(&executor, &repo, item.clone()).unwrap();

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.next_jobs.len(), 1);
        let stored = repo.find(item.id).unwrap().unwrap();
        assert_eq!(stored.processing_step(), Some(ProcessingStep::StructuringCompleted));
    }

    #[test]
    fn checkpoint_alone_skips_extraction() {
        let repo = InMemoryContentRepository::new();
        let mut item = processing_item("Action: ship it by Monday");
        item.metadata.processing_step = Some(ProcessingStep::EntityExtractionCompleted);
        repo.insert_new(item.clone()).unwrap();

        let extractor = Arc::new(CountingExtractor::default());
        let executor = BrainDumpExecutor::new(extractor.clone());
        let result = run(&executor, &repo, item.clone()).unwrap();

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.next_jobs.len(), 1);
        let stored = repo.find(item.id).unwrap().unwrap();
        assert_eq!(stored.processing_step(), Some(ProcessingStep::StructuringCompleted));
        assert_eq!(stored.metadata.get(TASKS_KEY).unwrap(), &serde_json::json!([]));
    }
}
