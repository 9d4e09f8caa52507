//! Stage executor seam and the lookup table the scheduler dispatches through.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use brainflow_core::workflow;
use brainflow_core::{ContentId, ContentItem, Priority, ProcessingStep};

use crate::jobs::{Job, JobPayload, JobType};
use crate::repository::ContentRepository;

use super::error::WorkflowError;

/// A follow-up job emitted by a successful stage.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub payload: JobPayload,
    pub priority: Priority,
}

impl JobRequest {
    pub fn new(payload: JobPayload, priority: Priority) -> Self {
        Self { payload, priority }
    }
}

/// What a successful stage hands back to the scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// Enqueued only after the stage's own status write succeeded.
    pub next_jobs: Vec<JobRequest>,
    /// Last checkpoint reached during this run.
    pub checkpoint: Option<ProcessingStep>,
    /// Merged into the owning item's metadata on completion.
    pub output: BTreeMap<String, JsonValue>,
}

impl ExecutionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next(mut self, request: JobRequest) -> Self {
        self.next_jobs.push(request);
        self
    }

    pub fn with_checkpoint(mut self, step: ProcessingStep) -> Self {
        self.checkpoint = Some(step);
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.output.insert(key.into(), value);
        self
    }
}

/// Everything a stage may touch during one run.
///
/// `items` are the content items the scheduler leased for this job, in
/// payload order. Items that were failed or held by another worker are not
/// included.
pub struct ExecutionContext<'a> {
    job: &'a Job,
    items: Vec<ContentItem>,
    content: &'a dyn ContentRepository,
    now: DateTime<Utc>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        job: &'a Job,
        items: Vec<ContentItem>,
        content: &'a dyn ContentRepository,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job,
            items,
            content,
            now,
        }
    }

    pub fn job(&self) -> &Job {
        self.job
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The single item of a per-item job.
    pub fn item(&self) -> Result<&ContentItem, WorkflowError> {
        self.items
            .first()
            .ok_or_else(|| WorkflowError::not_found(format!("content for job {}", self.job.id)))
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    /// Persist a checkpoint for `content_id` right away, together with `extra`
    /// metadata, so an interrupted run can resume from here.
    pub fn checkpoint(
        &mut self,
        content_id: ContentId,
        step: ProcessingStep,
        extra: impl IntoIterator<Item = (String, JsonValue)>,
    ) -> Result<(), WorkflowError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == content_id)
            .ok_or_else(|| WorkflowError::not_found(format!("content {content_id}")))?;

        let mut transition = workflow::checkpoint(item, step, self.now)?;
        for (key, value) in extra {
            transition.metadata.insert(key, value);
        }

        let mut next = item.clone();
        next.apply(transition);
        self.content.save(&next)?;
        *item = next;
        Ok(())
    }

    /// Hand the (possibly checkpointed) items back to the scheduler.
    pub fn into_items(self) -> Vec<ContentItem> {
        self.items
    }
}

/// One workflow stage.
///
/// Implementations must be safe to run again for the same payload: jobs are
/// delivered at least once.
pub trait StageExecutor: Send + Sync {
    fn job_type(&self) -> JobType;

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError>;
}

impl<E> StageExecutor for Arc<E>
where
    E: StageExecutor + ?Sized,
{
    fn job_type(&self) -> JobType {
        (**self).job_type()
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError> {
        (**self).execute(ctx)
    }
}

/// Executor lookup keyed by job type.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for its job type.
    pub fn register(&mut self, executor: Arc<dyn StageExecutor>) -> &mut Self {
        self.executors.insert(executor.job_type(), executor);
        self
    }

    pub fn with(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&Arc<dyn StageExecutor>> {
        self.executors.get(&job_type)
    }

    pub fn job_types(&self) -> impl Iterator<Item = JobType> + '_ {
        self.executors.keys().copied()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("job_types", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use brainflow_core::{ContentStatus, UserId};

    use crate::jobs::Lane;
    use crate::repository::InMemoryContentRepository;

    use super::*;

    struct Noop;

    impl StageExecutor for Noop {
        fn job_type(&self) -> JobType {
            JobType::FeedbackLearning
        }

        fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError> {
            Ok(ExecutionResult::new())
        }
    }

    #[test]
    fn registry_dispatches_by_job_type() {
        let registry = ExecutorRegistry::new().with(Arc::new(Noop));
        assert!(registry.get(JobType::FeedbackLearning).is_some());
        assert!(registry.get(JobType::BrainDumpParse).is_none());
    }

    #[test]
    fn checkpoint_is_persisted_immediately() {
        let now = Utc::now();
        let repo = InMemoryContentRepository::new();
        let mut item = ContentItem::new(UserId::new(), "notes", now);
        item.status = ContentStatus::Processing;
        repo.insert_new(item.clone()).unwrap();

        let job = Job::new(JobPayload::brain_dump(item.id), Lane::AiProcessing, now);
        let mut ctx = ExecutionContext::new(&job, vec![item.clone()], &repo, now);

        ctx.checkpoint(
            item.id,
            ProcessingStep::EntityExtractionCompleted,
            [("extracted_entities".to_string(), serde_json::json!({"projects": []}))],
        )
        .unwrap();

        let stored = repo.find(item.id).unwrap().unwrap();
        assert_eq!(
            stored.processing_step(),
            Some(ProcessingStep::EntityExtractionCompleted)
        );
        assert!(stored.metadata.get("extracted_entities").is_some());
        assert_eq!(ctx.item().unwrap(), &stored);
    }
}
