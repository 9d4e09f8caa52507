//! `WorkflowScheduler`: the one object that owns queue, guard and stage dispatch.
//!
//! A run of a job goes: claim -> guard -> `begin` transition -> execute ->
//! `complete` / `fail` / retry -> release guard. Only stages whose job type
//! owns the item's status (`BrainDumpParse`, `AiContentGeneration`) write the
//! item's status, and they do so only while holding the `content:<id>` lease.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use brainflow_ai::{
    AiClient, DeadlineClient, Embedder, EntityExtractor, HashEmbedder, OfflineAiClient,
    RuleBasedExtractor,
};
use brainflow_core::workflow;
use brainflow_core::{
    ContentId, ContentItem, ContentStatus, Feedback, FeedbackId, Priority, ProcessingStep,
};
use brainflow_events::{InMemoryEventBus, WorkflowEvent, WorkflowEventKind};

use crate::clock::{Clock, SystemClock};
use crate::config::WorkerConfig;
use crate::jobs::{
    FailureDisposition, InMemoryJobQueue, Job, JobHandle, JobId, JobPayload, JobQueue, JobStats,
    JobStatus, JobType, Lane, QueueRouter, RetryPolicy,
};
use crate::lease::{DEFAULT_LEASE_TTL, InMemoryLeaseStore, LeaseGuard, LeaseStore};
use crate::notify::WorkflowEventSink;
use crate::records::{InMemoryJobRecordStore, JobRecordStore};
use crate::repository::{
    ContentRepository, EmbeddingStore, FeedbackRepository, InMemoryContentRepository,
    InMemoryEmbeddingStore, InMemoryFeedbackRepository, InMemoryLearningSink, LearningSink,
};
use crate::workflow::{
    BrainDumpExecutor, ContentGenerationExecutor, EmbeddingExecutor, ExecutionContext,
    ExecutionResult, ExecutorRegistry, FeedbackLearningExecutor, JobRequest, StageExecutor,
    WorkflowError,
};

/// Jobs still `running` after this long are assumed abandoned by a dead worker.
///
/// Longer than the lease TTL, so a redelivered job finds the guard free.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(600);

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed { next_jobs: Vec<JobHandle> },
    RetryScheduled { attempt: u32, delay: Duration },
    DeadLettered { reason: String },
    Skipped { reason: String },
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed { .. })
    }
}

fn lease_key(scope: &str, id: impl std::fmt::Display) -> String {
    format!("{scope}:{id}")
}

/// Guards and items a job may run with.
struct Run {
    guards: Vec<LeaseGuard>,
    items: Vec<ContentItem>,
    /// Whether this run moved the owning item into `processing` and must finish it.
    drives_status: bool,
    /// Whether a terminal failure of this run fails the owning item.
    fails_owner: bool,
}

enum Preparation {
    Run(Run),
    Skip { content_id: Option<ContentId>, reason: String },
}

pub struct WorkflowScheduler {
    queue: Arc<dyn JobQueue>,
    router: QueueRouter,
    retry_policy: RetryPolicy,
    leases: Arc<dyn LeaseStore>,
    lease_ttl: Duration,
    stall_timeout: Duration,
    content: Arc<dyn ContentRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    executors: ExecutorRegistry,
    events: Arc<dyn WorkflowEventSink>,
    clock: Arc<dyn Clock>,
}

impl WorkflowScheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    pub fn router(&self) -> &QueueRouter {
        &self.router
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn content(&self) -> &Arc<dyn ContentRepository> {
        &self.content
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ---- submission -------------------------------------------------------

    /// Route and enqueue a job.
    ///
    /// Submitting the same work twice is allowed; the guard sorts it out at
    /// processing time. Work for failed items is refused.
    pub fn enqueue(
        &self,
        payload: JobPayload,
        priority: Priority,
        lane_override: Option<Lane>,
    ) -> Result<JobHandle, WorkflowError> {
        let payload = self.admit(payload)?;
        let job_type = payload.job_type();
        let lane = lane_override.unwrap_or_else(|| self.router.route(job_type, priority));
        let now = self.clock.now();

        let job = Job::new(payload, lane, now)
            .with_priority(priority)
            .with_retry_policy(self.retry_policy.clone());
        let handle = JobHandle::from(&job);
        let content_ids = job.payload.content_ids();

        self.queue.enqueue(job)?;
        info!(job_id = %handle.id, job_type = %job_type, lane = %lane, "job enqueued");

        let kind = WorkflowEventKind::JobEnqueued {
            job_id: handle.id.0,
            job_type: job_type.as_str().to_string(),
            lane: lane.as_str().to_string(),
        };
        if content_ids.is_empty() {
            self.events.emit(WorkflowEvent::new(None, kind, now));
        } else {
            for content_id in content_ids {
                self.events
                    .emit(WorkflowEvent::new(Some(content_id), kind.clone(), now));
            }
        }

        Ok(handle)
    }

    /// Store a new item and queue it for parsing.
    pub fn submit_brain_dump(&self, item: ContentItem) -> Result<JobHandle, WorkflowError> {
        let content_id = item.id;
        let priority = item.priority();
        self.content.insert(item)?;
        self.enqueue(JobPayload::brain_dump(content_id), priority, None)
    }

    /// Store a feedback record and queue it for learning.
    pub fn submit_feedback(&self, feedback: Feedback) -> Result<JobHandle, WorkflowError> {
        let feedback_id = feedback.id;
        self.feedback.insert(feedback)?;
        self.enqueue(JobPayload::feedback_learning(feedback_id), Priority::Normal, None)
    }

    fn admit(&self, payload: JobPayload) -> Result<JobPayload, WorkflowError> {
        match payload {
            JobPayload::EmbeddingGeneration { content_ids } => {
                if content_ids.is_empty() {
                    return Err(WorkflowError::validation("embedding batch is empty"));
                }

                let mut admitted: Vec<ContentId> = Vec::with_capacity(content_ids.len());
                let mut first_failed = None;
                for content_id in content_ids {
                    if admitted.contains(&content_id) {
                        continue;
                    }
                    let item = self.load_content(content_id)?;
                    if item.is_failed() {
                        warn!(%content_id, "dropping failed item from embedding batch");
                        first_failed.get_or_insert(content_id);
                    } else {
                        admitted.push(content_id);
                    }
                }

                match (admitted.is_empty(), first_failed) {
                    (true, Some(content_id)) => Err(WorkflowError::ContentFailed(content_id)),
                    _ => Ok(JobPayload::EmbeddingGeneration {
                        content_ids: admitted,
                    }),
                }
            }
            JobPayload::FeedbackLearning { feedback_id } => {
                let feedback = self.load_feedback(feedback_id)?;
                if self
                    .content
                    .get(feedback.content_id)?
                    .is_some_and(|item| item.is_failed())
                {
                    return Err(WorkflowError::ContentFailed(feedback.content_id));
                }
                Ok(JobPayload::FeedbackLearning { feedback_id })
            }
            primary => {
                if let Some(content_id) = primary.status_owner() {
                    if self.load_content(content_id)?.is_failed() {
                        return Err(WorkflowError::ContentFailed(content_id));
                    }
                }
                Ok(primary)
            }
        }
    }

    // ---- processing -------------------------------------------------------

    /// Claim and process the next ready job in `lane`.
    pub fn run_next(&self, lane: Lane) -> Result<Option<DispatchOutcome>, WorkflowError> {
        let now = self.clock.now();
        match self.queue.claim_next(lane, now)? {
            Some(job) => self.process(job).map(Some),
            None => Ok(None),
        }
    }

    /// Process everything currently ready in `lane`.
    pub fn drain(&self, lane: Lane) -> Result<Vec<DispatchOutcome>, WorkflowError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next(lane)? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Run a job that has already been claimed (status `running`).
    pub fn process(&self, job: Job) -> Result<DispatchOutcome, WorkflowError> {
        let started = self.clock.now();
        let job_type = job.job_type();
        debug!(job_id = %job.id, job_type = %job_type, lane = %job.lane, attempt = job.attempt, "processing job");

        let Some(executor) = self.executors.get(job_type).cloned() else {
            return self.fail(job, started, None, WorkflowError::NoExecutor(job_type));
        };

        let run = match self.prepare(&job, started) {
            Ok(Preparation::Run(run)) => run,
            Ok(Preparation::Skip { content_id, reason }) => return self.skip(job, content_id, reason),
            Err(err) => return self.fail(job, started, None, err),
        };
        let Run {
            guards,
            items,
            drives_status,
            fails_owner,
        } = run;

        // Redelivered after a stall with nothing left in the policy.
        if job.attempt > job.retry_policy.max_attempts {
            let last_error = job
                .history
                .last()
                .and_then(|attempt| attempt.error.clone())
                .unwrap_or_else(|| "redelivered after stall".to_string());
            let err = WorkflowError::RetryExhausted {
                attempts: job.retry_policy.max_attempts,
                last_error,
            };
            let owner = items.into_iter().next().filter(|_| fails_owner);
            return self.fail(job, started, owner, err);
        }

        let mut ctx = ExecutionContext::new(&job, items, self.content.as_ref(), started);
        let result = executor.execute(&mut ctx);
        let items = ctx.into_items();
        let owner_item = match job.payload.status_owner() {
            Some(_) => items.into_iter().next(),
            None => None,
        };

        let outcome = match result {
            Ok(result) => match self.finish_item(owner_item.clone(), drives_status, &result) {
                Ok(()) => self.complete(job, started, result),
                Err(err) => self.fail(job, started, owner_item.filter(|_| fails_owner), err),
            },
            Err(err) => self.fail(job, started, owner_item.filter(|_| fails_owner), err),
        };

        drop(guards);
        outcome
    }

    fn prepare(&self, job: &Job, now: chrono::DateTime<chrono::Utc>) -> Result<Preparation, WorkflowError> {
        match &job.payload {
            JobPayload::BrainDumpParse { content_id }
            | JobPayload::AiContentGeneration { content_id, .. } => {
                self.prepare_owner(job, *content_id, now)
            }
            JobPayload::EmbeddingGeneration { content_ids } => self.prepare_batch(job, content_ids, now),
            JobPayload::FeedbackLearning { feedback_id } => self.prepare_feedback(job, *feedback_id, now),
        }
    }

    fn prepare_owner(
        &self,
        job: &Job,
        content_id: ContentId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Preparation, WorkflowError> {
        let Some(guard) = self.acquire(lease_key("content", content_id), now)? else {
            self.emit_duplicate(job, Some(content_id));
            return Ok(Preparation::Skip {
                content_id: Some(content_id),
                reason: "content item is being processed by another worker".to_string(),
            });
        };

        let mut item = self.load_content(content_id)?;
        let (drives_status, fails_owner) = match item.status {
            ContentStatus::Failed => {
                return Ok(Preparation::Skip {
                    content_id: Some(content_id),
                    reason: "content item has failed".to_string(),
                });
            }
            ContentStatus::Processed if job.job_type() == JobType::BrainDumpParse => {
                return Ok(Preparation::Skip {
                    content_id: Some(content_id),
                    reason: "content item already processed".to_string(),
                });
            }
            // Generating from processed content leaves its status alone.
            ContentStatus::Processed => (false, false),
            ContentStatus::Pending | ContentStatus::Processing if job.job_type().owns_status() => {
                let from = item.status;
                item.apply(workflow::begin(&item, ProcessingStep::Started, now)?);
                self.content.save(&item)?;
                self.status_changed(&item, from);
                (true, true)
            }
            // Generation ahead of the parse leaves the status to the parse.
            ContentStatus::Pending | ContentStatus::Processing => (false, true),
        };

        Ok(Preparation::Run(Run {
            guards: vec![guard],
            items: vec![item],
            drives_status,
            fails_owner,
        }))
    }

    fn prepare_batch(
        &self,
        job: &Job,
        content_ids: &[ContentId],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Preparation, WorkflowError> {
        let mut guards = Vec::new();
        let mut items: Vec<ContentItem> = Vec::new();

        for &content_id in content_ids {
            if items.iter().any(|item| item.id == content_id) {
                continue;
            }
            let Some(item) = self.content.get(content_id)? else {
                warn!(job_id = %job.id, %content_id, "content item missing; dropped from batch");
                continue;
            };
            if item.is_failed() {
                warn!(job_id = %job.id, %content_id, "content item failed; dropped from batch");
                continue;
            }
            match self.acquire(lease_key("embedding", content_id), now)? {
                Some(guard) => {
                    guards.push(guard);
                    items.push(item);
                }
                None => self.emit_duplicate(job, Some(content_id)),
            }
        }

        if items.is_empty() {
            return Ok(Preparation::Skip {
                content_id: None,
                reason: "no embeddable items left in batch".to_string(),
            });
        }

        Ok(Preparation::Run(Run {
            guards,
            items,
            drives_status: false,
            fails_owner: false,
        }))
    }

    fn prepare_feedback(
        &self,
        job: &Job,
        feedback_id: FeedbackId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Preparation, WorkflowError> {
        let Some(guard) = self.acquire(lease_key("feedback", feedback_id), now)? else {
            self.emit_duplicate(job, None);
            return Ok(Preparation::Skip {
                content_id: None,
                reason: "feedback is being learned by another worker".to_string(),
            });
        };

        let feedback = self.load_feedback(feedback_id)?;
        if self
            .content
            .get(feedback.content_id)?
            .is_some_and(|item| item.is_failed())
        {
            return Ok(Preparation::Skip {
                content_id: Some(feedback.content_id),
                reason: "content item has failed".to_string(),
            });
        }

        Ok(Preparation::Run(Run {
            guards: vec![guard],
            items: Vec::new(),
            drives_status: false,
            fails_owner: false,
        }))
    }

    /// Write the stage output (and `processed`, when this run drives status).
    fn finish_item(
        &self,
        item: Option<ContentItem>,
        drives_status: bool,
        result: &ExecutionResult,
    ) -> Result<(), WorkflowError> {
        let Some(mut item) = item else {
            return Ok(());
        };
        let now = self.clock.now();
        let from = item.status;

        if drives_status {
            let mut transition = workflow::complete(&item, now)?;
            for (key, value) in &result.output {
                transition.metadata.insert(key.clone(), value.clone());
            }
            item.apply(transition);
        } else if !result.output.is_empty() {
            for (key, value) in &result.output {
                item.metadata.insert(key.clone(), value.clone());
            }
            item.updated_at = now;
        } else {
            return Ok(());
        }

        self.content.save(&item)?;
        self.status_changed(&item, from);
        Ok(())
    }

    fn complete(
        &self,
        mut job: Job,
        started: chrono::DateTime<chrono::Utc>,
        result: ExecutionResult,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let now = self.clock.now();
        job.mark_completed(started, now);
        self.queue.update(&job)?;
        info!(job_id = %job.id, job_type = %job.job_type(), attempt = job.attempt, "job completed");

        let mut next_jobs = Vec::with_capacity(result.next_jobs.len());
        for request in result.next_jobs {
            match self.enqueue(request.payload.clone(), request.priority, None) {
                Ok(handle) => next_jobs.push(handle),
                Err(WorkflowError::ContentFailed(content_id)) => {
                    warn!(job_id = %job.id, %content_id, "follow-up dropped; content item has failed");
                }
                Err(err) => self.park_follow_up(&job, request, &err),
            }
        }

        Ok(DispatchOutcome::Completed { next_jobs })
    }

    /// Dead-letter a follow-up that could not be enqueued so it can be
    /// redispatched instead of lost.
    fn park_follow_up(&self, parent: &Job, request: JobRequest, err: &WorkflowError) {
        let now = self.clock.now();
        let job_type = request.payload.job_type();
        let lane = self.router.route(job_type, request.priority);
        let job = Job::new(request.payload, lane, now)
            .with_priority(request.priority)
            .with_retry_policy(self.retry_policy.clone());
        let job_id = job.id;
        let content_ids = job.payload.content_ids();
        let reason = format!("follow-up enqueue failed: {err}");

        if let Err(park_err) = self.queue.dead_letter(job, reason.clone(), now) {
            error!(
                parent_id = %parent.id,
                job_type = %job_type,
                error = %err,
                dead_letter_error = %park_err,
                "follow-up job lost"
            );
            return;
        }
        error!(parent_id = %parent.id, %job_id, job_type = %job_type, error = %err, "follow-up job dead-lettered");

        let kind = WorkflowEventKind::JobDeadLettered {
            job_id: job_id.0,
            reason,
        };
        if content_ids.is_empty() {
            self.events.emit(WorkflowEvent::new(None, kind, now));
        } else {
            for content_id in content_ids {
                self.events
                    .emit(WorkflowEvent::new(Some(content_id), kind.clone(), now));
            }
        }
    }

    fn fail(
        &self,
        mut job: Job,
        started: chrono::DateTime<chrono::Utc>,
        driven_item: Option<ContentItem>,
        err: WorkflowError,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let now = self.clock.now();
        let retryable = err.is_retryable();
        let message = err.to_string();

        match job.mark_failed(message.clone(), retryable, started, now) {
            FailureDisposition::Retry { delay } => {
                self.queue.update(&job)?;
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    delay_secs = delay.as_secs(),
                    error = %message,
                    "job failed; retry scheduled"
                );
                Ok(DispatchOutcome::RetryScheduled {
                    attempt: job.attempt,
                    delay,
                })
            }
            FailureDisposition::Dead => {
                let reason = if retryable {
                    WorkflowError::RetryExhausted {
                        attempts: job.attempt,
                        last_error: message,
                    }
                    .to_string()
                } else {
                    message
                };
                let job_id = job.id;
                let content_id = job.payload.status_owner();

                self.queue.dead_letter(job, reason.clone(), now)?;
                error!(%job_id, error = %reason, "job dead-lettered");
                self.events.emit(WorkflowEvent::new(
                    content_id,
                    WorkflowEventKind::JobDeadLettered {
                        job_id: job_id.0,
                        reason: reason.clone(),
                    },
                    now,
                ));

                if let Some(item) = driven_item {
                    self.fail_item(item, &reason)?;
                }

                Ok(DispatchOutcome::DeadLettered { reason })
            }
        }
    }

    fn fail_item(&self, mut item: ContentItem, reason: &str) -> Result<(), WorkflowError> {
        if item.is_failed() {
            return Ok(());
        }
        let now = self.clock.now();
        let from = item.status;
        item.apply(workflow::fail(&item, reason, now)?);
        self.content.save(&item)?;
        self.status_changed(&item, from);
        Ok(())
    }

    fn skip(
        &self,
        mut job: Job,
        content_id: Option<ContentId>,
        reason: String,
    ) -> Result<DispatchOutcome, WorkflowError> {
        job.mark_skipped(reason.clone(), self.clock.now());
        self.queue.update(&job)?;
        info!(job_id = %job.id, content_id = ?content_id, reason = %reason, "job skipped");
        Ok(DispatchOutcome::Skipped { reason })
    }

    // ---- recovery ---------------------------------------------------------

    /// Explicitly redispatch a failed item.
    ///
    /// Dead-lettered jobs that owned the item are revived; if there are none a
    /// fresh parse is queued. Checkpoints are kept, so work resumes.
    pub fn redispatch(&self, content_id: ContentId) -> Result<Vec<JobHandle>, WorkflowError> {
        let item = self.reset_failed_item(content_id)?;

        let dead: Vec<Job> = self
            .queue
            .list_for_content(content_id)?
            .into_iter()
            .filter(|job| {
                matches!(job.status, JobStatus::DeadLettered { .. })
                    && job.payload.status_owner() == Some(content_id)
            })
            .collect();

        if dead.is_empty() {
            return Ok(vec![self.enqueue(
                JobPayload::brain_dump(content_id),
                item.priority(),
                None,
            )?]);
        }

        dead.iter()
            .map(|job| self.revive(job.id))
            .collect()
    }

    /// Revive one dead-lettered job, resetting its owning item if it failed.
    pub fn redispatch_dead_letter(&self, job_id: JobId) -> Result<JobHandle, WorkflowError> {
        let job = self
            .queue
            .get(job_id)?
            .ok_or_else(|| WorkflowError::not_found(format!("job {job_id}")))?;

        if let Some(content_id) = job.payload.status_owner() {
            if self.load_content(content_id)?.is_failed() {
                self.reset_failed_item(content_id)?;
            }
        }
        self.revive(job_id)
    }

    fn revive(&self, job_id: JobId) -> Result<JobHandle, WorkflowError> {
        let job = self.queue.retry_dead_letter(job_id, self.clock.now())?;
        info!(job_id = %job.id, lane = %job.lane, "dead-lettered job redispatched");
        Ok(JobHandle::from(&job))
    }

    fn reset_failed_item(&self, content_id: ContentId) -> Result<ContentItem, WorkflowError> {
        let mut item = self.load_content(content_id)?;
        let from = item.status;
        item.reset_for_redispatch(self.clock.now())?;
        self.content.save(&item)?;
        self.status_changed(&item, from);
        Ok(item)
    }

    /// Put jobs abandoned by dead workers back in their lanes.
    pub fn recover_stalled(&self) -> Result<usize, WorkflowError> {
        let timeout = chrono::Duration::from_std(self.stall_timeout)
            .map_err(|e| WorkflowError::validation(e.to_string()))?;
        let requeued = self.queue.requeue_stalled(timeout, self.clock.now())?;
        if requeued > 0 {
            warn!(requeued, "requeued stalled jobs");
        }
        Ok(requeued)
    }

    pub fn stats(&self, lane: Option<Lane>) -> Result<JobStats, WorkflowError> {
        Ok(self.queue.stats(lane)?)
    }

    // ---- helpers ----------------------------------------------------------

    fn acquire(
        &self,
        key: String,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<LeaseGuard>, WorkflowError> {
        Ok(LeaseGuard::try_acquire(self.leases.clone(), key, self.lease_ttl, now)?)
    }

    fn load_content(&self, content_id: ContentId) -> Result<ContentItem, WorkflowError> {
        self.content
            .get(content_id)?
            .ok_or_else(|| WorkflowError::not_found(format!("content {content_id}")))
    }

    fn load_feedback(&self, feedback_id: FeedbackId) -> Result<Feedback, WorkflowError> {
        self.feedback
            .get(feedback_id)?
            .ok_or_else(|| WorkflowError::not_found(format!("feedback {feedback_id}")))
    }

    fn status_changed(&self, item: &ContentItem, from: ContentStatus) {
        if from == item.status {
            return;
        }
        info!(content_id = %item.id, from = %from, to = %item.status, "content status changed");
        self.events.emit(WorkflowEvent::status_changed(
            item.id,
            from,
            item.status,
            item.updated_at,
        ));
    }

    fn emit_duplicate(&self, job: &Job, content_id: Option<ContentId>) {
        info!(job_id = %job.id, content_id = ?content_id, "duplicate work in flight; skipping");
        self.events.emit(WorkflowEvent::new(
            content_id,
            WorkflowEventKind::DuplicateSkipped {
                job_id: job.id.0,
                stage: job.job_type().as_str().to_string(),
            },
            self.clock.now(),
        ));
    }
}

impl std::fmt::Debug for WorkflowScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowScheduler")
            .field("router", &self.router)
            .field("retry_policy", &self.retry_policy)
            .field("lease_ttl", &self.lease_ttl)
            .field("executors", &self.executors)
            .finish()
    }
}

/// Builds a scheduler; every collaborator defaults to its in-memory version.
#[derive(Default)]
pub struct SchedulerBuilder {
    queue: Option<Arc<dyn JobQueue>>,
    router: Option<QueueRouter>,
    retry_policy: Option<RetryPolicy>,
    leases: Option<Arc<dyn LeaseStore>>,
    lease_ttl: Option<Duration>,
    stall_timeout: Option<Duration>,
    content: Option<Arc<dyn ContentRepository>>,
    feedback: Option<Arc<dyn FeedbackRepository>>,
    records: Option<Arc<dyn JobRecordStore>>,
    embeddings: Option<Arc<dyn EmbeddingStore>>,
    learning: Option<Arc<dyn LearningSink>>,
    ai_client: Option<Arc<dyn AiClient>>,
    ai_timeout: Option<Duration>,
    embedder: Option<Arc<dyn Embedder>>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    events: Option<Arc<dyn WorkflowEventSink>>,
    clock: Option<Arc<dyn Clock>>,
    extra_executors: Vec<Arc<dyn StageExecutor>>,
}

impl SchedulerBuilder {
    /// Apply router, retry policy, lease TTL, stall timeout and AI timeout.
    pub fn configure(mut self, config: &WorkerConfig) -> Self {
        self.router = Some(config.router());
        self.retry_policy = Some(config.retry_policy());
        self.lease_ttl = Some(config.lease_ttl());
        self.stall_timeout = Some(config.stall_timeout());
        self.ai_timeout = Some(config.ai_timeout());
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_router(mut self, router: QueueRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_lease_store(mut self, leases: Arc<dyn LeaseStore>) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = Some(ttl);
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn with_content_repository(mut self, content: Arc<dyn ContentRepository>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_feedback_repository(mut self, feedback: Arc<dyn FeedbackRepository>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_record_store(mut self, records: Arc<dyn JobRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_embedding_store(mut self, embeddings: Arc<dyn EmbeddingStore>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn with_learning_sink(mut self, learning: Arc<dyn LearningSink>) -> Self {
        self.learning = Some(learning);
        self
    }

    pub fn with_ai_client(mut self, client: Arc<dyn AiClient>) -> Self {
        self.ai_client = Some(client);
        self
    }

    pub fn with_ai_timeout(mut self, timeout: Duration) -> Self {
        self.ai_timeout = Some(timeout);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn WorkflowEventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the built-in executor for `executor.job_type()`.
    pub fn with_executor(mut self, executor: Arc<dyn StageExecutor>) -> Self {
        self.extra_executors.push(executor);
        self
    }

    pub fn build(self) -> WorkflowScheduler {
        let content = self
            .content
            .unwrap_or_else(|| Arc::new(InMemoryContentRepository::new()));
        let feedback = self
            .feedback
            .unwrap_or_else(|| Arc::new(InMemoryFeedbackRepository::new()));
        let records = self
            .records
            .unwrap_or_else(|| Arc::new(InMemoryJobRecordStore::new()));
        let client: Arc<dyn AiClient> = Arc::new(DeadlineClient::new(
            self.ai_client
                .unwrap_or_else(|| Arc::new(OfflineAiClient::new("offline"))),
        ));

        let mut generation = ContentGenerationExecutor::new(client, records);
        if let Some(timeout) = self.ai_timeout {
            generation = generation.with_timeout_cap(timeout);
        }

        let mut executors = ExecutorRegistry::new()
            .with(Arc::new(BrainDumpExecutor::new(
                self.extractor.unwrap_or_else(|| Arc::new(RuleBasedExtractor)),
            )))
            .with(Arc::new(generation))
            .with(Arc::new(FeedbackLearningExecutor::new(
                feedback.clone(),
                self.learning
                    .unwrap_or_else(|| Arc::new(InMemoryLearningSink::new())),
            )))
            .with(Arc::new(EmbeddingExecutor::new(
                self.embedder.unwrap_or_else(|| Arc::new(HashEmbedder::new(64))),
                self.embeddings
                    .unwrap_or_else(|| Arc::new(InMemoryEmbeddingStore::new())),
            )));
        for executor in self.extra_executors {
            executors.register(executor);
        }

        WorkflowScheduler {
            queue: self.queue.unwrap_or_else(|| InMemoryJobQueue::arc()),
            router: self.router.unwrap_or_default(),
            retry_policy: self.retry_policy.unwrap_or_default(),
            leases: self
                .leases
                .unwrap_or_else(|| Arc::new(InMemoryLeaseStore::new())),
            lease_ttl: self.lease_ttl.unwrap_or(DEFAULT_LEASE_TTL),
            stall_timeout: self.stall_timeout.unwrap_or(DEFAULT_STALL_TIMEOUT),
            content,
            feedback,
            executors,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(InMemoryEventBus::<WorkflowEvent>::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }
}
