//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brainflow_ai::GenerateOptions;
use brainflow_core::{ContentId, FeedbackId, Priority};

use super::lane::Lane;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow stage a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    BrainDumpParse,
    AiContentGeneration,
    FeedbackLearning,
    EmbeddingGeneration,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::BrainDumpParse,
        JobType::AiContentGeneration,
        JobType::FeedbackLearning,
        JobType::EmbeddingGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::BrainDumpParse => "brain_dump_parse",
            JobType::AiContentGeneration => "ai_content_generation",
            JobType::FeedbackLearning => "feedback_learning",
            JobType::EmbeddingGeneration => "embedding_generation",
        }
    }

    /// Only the parse moves a content item through `processing` to
    /// `processed`. Generation merges its output and can only fail the item;
    /// embeddings and learning never touch the status.
    pub fn owns_status(&self) -> bool {
        matches!(self, JobType::BrainDumpParse)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job operates on; one variant per [`JobType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    BrainDumpParse {
        content_id: ContentId,
    },
    AiContentGeneration {
        content_id: ContentId,
        /// e.g. `release_notes`, `summary`
        content_type: String,
        #[serde(default)]
        options: GenerateOptions,
    },
    FeedbackLearning {
        feedback_id: FeedbackId,
    },
    EmbeddingGeneration {
        /// Ordered batch; a single item is a batch of one.
        content_ids: Vec<ContentId>,
    },
}

impl JobPayload {
    pub fn brain_dump(content_id: ContentId) -> Self {
        Self::BrainDumpParse { content_id }
    }

    pub fn content_generation(
        content_id: ContentId,
        content_type: impl Into<String>,
        options: GenerateOptions,
    ) -> Self {
        Self::AiContentGeneration {
            content_id,
            content_type: content_type.into(),
            options,
        }
    }

    pub fn feedback_learning(feedback_id: FeedbackId) -> Self {
        Self::FeedbackLearning { feedback_id }
    }

    pub fn embeddings(content_ids: impl IntoIterator<Item = ContentId>) -> Self {
        Self::EmbeddingGeneration {
            content_ids: content_ids.into_iter().collect(),
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::BrainDumpParse { .. } => JobType::BrainDumpParse,
            JobPayload::AiContentGeneration { .. } => JobType::AiContentGeneration,
            JobPayload::FeedbackLearning { .. } => JobType::FeedbackLearning,
            JobPayload::EmbeddingGeneration { .. } => JobType::EmbeddingGeneration,
        }
    }

    /// Content items referenced directly by the payload.
    pub fn content_ids(&self) -> Vec<ContentId> {
        match self {
            JobPayload::BrainDumpParse { content_id }
            | JobPayload::AiContentGeneration { content_id, .. } => vec![*content_id],
            JobPayload::EmbeddingGeneration { content_ids } => content_ids.clone(),
            JobPayload::FeedbackLearning { .. } => Vec::new(),
        }
    }

    /// The item whose status this job drives, if any.
    pub fn status_owner(&self) -> Option<ContentId> {
        match self {
            JobPayload::BrainDumpParse { content_id }
            | JobPayload::AiContentGeneration { content_id, .. } => Some(*content_id),
            _ => None,
        }
    }

    pub fn references(&self, content_id: ContentId) -> bool {
        self.content_ids().contains(&content_id)
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Running,
    /// Completed successfully
    Completed,
    /// Failed with a transient error; will run again at `scheduled_at`
    RetryScheduled { error: String, attempt: u32 },
    /// Fatal error or retries exhausted; moved to the dead-letter list
    DeadLettered { error: String, attempts: u32 },
    /// Not executed (duplicate in flight, item already terminal, ...)
    Skipped { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::DeadLettered { .. } | JobStatus::Skipped { .. }
        )
    }

    /// Whether a worker may claim a job in this status.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::RetryScheduled { .. })
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    Exponential,
    /// Linear backoff: base * attempt
    #[default]
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first run included
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(120),
            max_delay: Duration::from_secs(60 * 60),
            strategy: BackoffStrategy::Linear,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with linear backoff.
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            strategy: BackoffStrategy::Linear,
            ..Default::default()
        }
    }

    /// Delay before the run that follows failed attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Whether another run is allowed after `attempt` runs.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Retry { delay: Duration },
    Dead,
}

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    pub payload: JobPayload,
    /// Lane the job was routed to
    pub lane: Lane,
    pub priority: Priority,
    /// Current status
    pub status: JobStatus,
    /// Retry policy
    pub retry_policy: RetryPolicy,
    /// Runs started so far (0 until first claim)
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time the job may run (set by retry backoff)
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Execution history (one record per finished attempt)
    pub history: Vec<JobAttemptRecord>,
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

impl Job {
    pub fn new(payload: JobPayload, lane: Lane, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            payload,
            lane,
            priority: Priority::Normal,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| now >= at)
    }

    /// The current run is the last one the retry policy allows.
    pub fn is_final_attempt(&self) -> bool {
        !self.retry_policy.should_retry(self.attempt)
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.scheduled_at = None;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.record_attempt(started_at, now, None);
    }

    /// Record a failed attempt and decide between backoff and dead-lettering.
    ///
    /// Non-retryable errors dead-letter immediately regardless of attempts left.
    pub fn mark_failed(
        &mut self,
        error: String,
        retryable: bool,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> FailureDisposition {
        self.updated_at = now;
        self.record_attempt(started_at, now, Some(error.clone()));

        if retryable && self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + to_chrono(delay));
            self.status = JobStatus::RetryScheduled {
                error,
                attempt: self.attempt,
            };
            FailureDisposition::Retry { delay }
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
            FailureDisposition::Dead
        }
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Skipped {
            reason: reason.into(),
        };
        self.updated_at = now;
    }

    fn record_attempt(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>, error: Option<String>) {
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: error.is_none(),
            error,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

/// What `enqueue` hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: JobId,
    pub job_type: JobType,
    pub lane: Lane,
}

impl From<&Job> for JobHandle {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type(),
            lane: job.lane,
        }
    }
}

/// Entry in the dead-letter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String, now: DateTime<Utc>) -> Self {
        Self {
            job,
            dead_lettered_at: now,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse_job() -> Job {
        Job::new(JobPayload::brain_dump(ContentId::new()), Lane::AiProcessing, Utc::now())
    }

    #[test]
    fn default_policy_is_linear_from_120s() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(240));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(360));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            strategy: BackoffStrategy::Exponential,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn transient_failures_back_off_then_dead_letter() {
        let now = Utc::now();
        let mut job = parse_job();

        job.mark_running(now);
        assert_eq!(
            job.mark_failed("timeout".into(), true, now, now),
            FailureDisposition::Retry { delay: Duration::from_secs(120) }
        );
        assert_eq!(job.scheduled_at, Some(now + chrono::Duration::seconds(120)));
        assert!(!job.is_ready(now));
        assert!(job.status.is_claimable());

        job.mark_running(now);
        assert_eq!(
            job.mark_failed("timeout".into(), true, now, now),
            FailureDisposition::Retry { delay: Duration::from_secs(240) }
        );

        job.mark_running(now);
        assert!(job.is_final_attempt());
        assert_eq!(job.mark_failed("timeout".into(), true, now, now), FailureDisposition::Dead);
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 3, .. }));
        assert_eq!(job.history.len(), 3);
    }

    #[test]
    fn fatal_failure_dead_letters_on_first_attempt() {
        let now = Utc::now();
        let mut job = parse_job();
        job.mark_running(now);

        assert_eq!(job.mark_failed("empty content".into(), false, now, now), FailureDisposition::Dead);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn payload_knows_its_status_owner() {
        let id = ContentId::new();
        assert_eq!(JobPayload::brain_dump(id).status_owner(), Some(id));
        assert_eq!(JobPayload::embeddings([id]).status_owner(), None);
        assert!(JobPayload::embeddings([id]).references(id));
        assert!(JobPayload::feedback_learning(FeedbackId::new()).content_ids().is_empty());
    }

    #[test]
    fn payload_serializes_as_tagged_union() {
        let id = ContentId::new();
        let json = serde_json::to_value(JobPayload::brain_dump(id)).unwrap();
        assert_eq!(json["type"], "brain_dump_parse");
        assert_eq!(json["content_id"], id.to_string());
    }

    proptest! {
        #[test]
        fn linear_backoff_is_monotonic(base in 1u64..1_000, attempt in 1u32..50) {
            let policy = RetryPolicy {
                max_delay: Duration::from_secs(u64::MAX / 4),
                ..RetryPolicy::linear(100, Duration::from_secs(base))
            };
            let here = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);
            prop_assert!(next > here);
            prop_assert_eq!(here, Duration::from_secs(base * u64::from(attempt)));
        }
    }
}
