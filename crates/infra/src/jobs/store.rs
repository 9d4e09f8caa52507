//! Job queue storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use brainflow_core::ContentId;

use super::lane::Lane;
use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Queue abstraction the workers pull from.
///
/// Delivery is at-least-once: a job whose worker died stays `Running` until
/// [`JobQueue::requeue_stalled`] hands it out again, so executors must tolerate
/// redelivery.
pub trait JobQueue: Send + Sync {
    /// Enqueue a new job. Duplicate submissions for the same content are allowed.
    fn enqueue(&self, job: Job) -> Result<JobId, JobQueueError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobQueueError>;

    fn update(&self, job: &Job) -> Result<(), JobQueueError>;

    /// Claim the oldest ready job on `lane` and mark it running.
    fn claim_next(&self, lane: Lane, now: DateTime<Utc>) -> Result<Option<Job>, JobQueueError>;

    /// Jobs (live or dead-lettered) that reference `content_id`.
    fn list_for_content(&self, content_id: ContentId) -> Result<Vec<Job>, JobQueueError>;

    /// List live jobs by status (discriminant match), oldest first.
    fn list_by_status(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, JobQueueError>;

    /// Move a job to the dead-letter list.
    fn dead_letter(&self, job: Job, reason: String, now: DateTime<Utc>) -> Result<(), JobQueueError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobQueueError>;

    /// Move a dead-lettered job back to pending with a fresh attempt budget.
    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobQueueError>;

    /// Return `Running` jobs not updated for `timeout` to the queue.
    fn requeue_stalled(&self, timeout: Duration, now: DateTime<Utc>) -> Result<usize, JobQueueError>;

    fn stats(&self, lane: Option<Lane>) -> Result<JobStats, JobQueueError>;
}

impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobQueueError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobQueueError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobQueueError> {
        (**self).update(job)
    }

    fn claim_next(&self, lane: Lane, now: DateTime<Utc>) -> Result<Option<Job>, JobQueueError> {
        (**self).claim_next(lane, now)
    }

    fn list_for_content(&self, content_id: ContentId) -> Result<Vec<Job>, JobQueueError> {
        (**self).list_for_content(content_id)
    }

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, JobQueueError> {
        (**self).list_by_status(status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String, now: DateTime<Utc>) -> Result<(), JobQueueError> {
        (**self).dead_letter(job, reason, now)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobQueueError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobQueueError> {
        (**self).retry_dead_letter(job_id, now)
    }

    fn requeue_stalled(&self, timeout: Duration, now: DateTime<Utc>) -> Result<usize, JobQueueError> {
        (**self).requeue_stalled(timeout, now)
    }

    fn stats(&self, lane: Option<Lane>) -> Result<JobStats, JobQueueError> {
        (**self).stats(lane)
    }
}

/// Job queue error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobQueueError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub dead_lettered: usize,
    pub skipped: usize,
}

/// In-memory job queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

fn poisoned() -> JobQueueError {
    JobQueueError::Storage("job queue lock poisoned".to_string())
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobQueueError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobQueueError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn dead_letters(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobQueueError> {
        self.dead_letters.read().map_err(|_| poisoned())
    }

    fn dead_letters_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobQueueError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, job: Job) -> Result<JobId, JobQueueError> {
        let mut jobs = self.jobs_mut()?;
        if jobs.contains_key(&job.id) {
            return Err(JobQueueError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobQueueError> {
        if let Some(job) = self.jobs()?.get(&job_id) {
            return Ok(Some(job.clone()));
        }
        Ok(self.dead_letters()?.get(&job_id).map(|e| e.job.clone()))
    }

    fn update(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut jobs = self.jobs_mut()?;
        if !jobs.contains_key(&job.id) {
            return Err(JobQueueError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, lane: Lane, now: DateTime<Utc>) -> Result<Option<Job>, JobQueueError> {
        let mut jobs = self.jobs_mut()?;

        // FIFO within the lane; UUIDv7 ids break created_at ties.
        let next = jobs
            .values()
            .filter(|j| j.lane == lane && j.status.is_claimable() && j.is_ready(now))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running(now);
                job.clone()
            })
        }))
    }

    fn list_for_content(&self, content_id: ContentId) -> Result<Vec<Job>, JobQueueError> {
        let mut result: Vec<Job> = self
            .jobs()?
            .values()
            .filter(|j| j.payload.references(content_id))
            .cloned()
            .collect();

        result.extend(
            self.dead_letters()?
                .values()
                .filter(|e| e.job.payload.references(content_id))
                .map(|e| e.job.clone()),
        );

        result.sort_by_key(|j| (j.created_at, j.id));
        Ok(result)
    }

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, JobQueueError> {
        let mut result: Vec<Job> = self
            .jobs()?
            .values()
            .filter(|j| {
                status
                    .as_ref()
                    .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| (j.created_at, j.id));
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String, now: DateTime<Utc>) -> Result<(), JobQueueError> {
        let mut jobs = self.jobs_mut()?;
        let mut dls = self.dead_letters_mut()?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = now;

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason, now));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobQueueError> {
        let mut result: Vec<DeadLetterEntry> = self.dead_letters()?.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobQueueError> {
        let mut jobs = self.jobs_mut()?;
        let mut dls = self.dead_letters_mut()?;

        let entry = dls.remove(&job_id).ok_or(JobQueueError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = now;
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn requeue_stalled(&self, timeout: Duration, now: DateTime<Utc>) -> Result<usize, JobQueueError> {
        let mut jobs = self.jobs_mut()?;
        let mut requeued = 0;

        for job in jobs.values_mut() {
            if job.status == JobStatus::Running && now - job.updated_at >= timeout {
                job.status = JobStatus::Pending;
                job.updated_at = now;
                requeued += 1;
            }
        }

        Ok(requeued)
    }

    fn stats(&self, lane: Option<Lane>) -> Result<JobStats, JobQueueError> {
        let jobs = self.jobs()?;
        let dls = self.dead_letters()?;
        let in_lane = |job: &Job| lane.is_none_or(|l| job.lane == l);

        let mut stats = JobStats::default();

        for job in jobs.values().filter(|j| in_lane(j)) {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::RetryScheduled { .. } => stats.retry_scheduled += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
                JobStatus::Skipped { .. } => stats.skipped += 1,
            }
        }

        stats.dead_lettered += dls.values().filter(|e| in_lane(&e.job)).count();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobPayload;

    fn parse_job(lane: Lane, now: DateTime<Utc>) -> Job {
        Job::new(JobPayload::brain_dump(ContentId::new()), lane, now)
    }

    #[test]
    fn enqueue_and_claim_per_lane() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();

        let id = queue.enqueue(parse_job(Lane::AiProcessing, now)).unwrap();
        queue.enqueue(parse_job(Lane::AiProcessingHigh, now)).unwrap();

        let claimed = queue.claim_next(Lane::AiProcessing, now).unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);

        assert!(queue.claim_next(Lane::AiProcessing, now).unwrap().is_none());
        assert!(queue.claim_next(Lane::AiProcessingHigh, now).unwrap().is_some());
    }

    #[test]
    fn claims_in_fifo_order() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();

        let first = queue.enqueue(parse_job(Lane::AiProcessing, now)).unwrap();
        let second = queue
            .enqueue(parse_job(Lane::AiProcessing, now + Duration::seconds(1)))
            .unwrap();

        let later = now + Duration::seconds(5);
        assert_eq!(queue.claim_next(Lane::AiProcessing, later).unwrap().unwrap().id, first);
        assert_eq!(queue.claim_next(Lane::AiProcessing, later).unwrap().unwrap().id, second);
    }

    #[test]
    fn backed_off_jobs_wait_until_scheduled() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();
        queue.enqueue(parse_job(Lane::AiProcessing, now)).unwrap();

        let mut job = queue.claim_next(Lane::AiProcessing, now).unwrap().unwrap();
        job.mark_failed("timeout".into(), true, now, now);
        queue.update(&job).unwrap();

        assert!(queue.claim_next(Lane::AiProcessing, now + Duration::seconds(119)).unwrap().is_none());
        let again = queue
            .claim_next(Lane::AiProcessing, now + Duration::seconds(120))
            .unwrap()
            .unwrap();
        assert_eq!(again.attempt, 2);
    }

    #[test]
    fn dead_letter_flow() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();
        let job = parse_job(Lane::AiProcessing, now);
        let content_id = job.payload.content_ids()[0];
        let job_id = queue.enqueue(job).unwrap();

        let claimed = queue.claim_next(Lane::AiProcessing, now).unwrap().unwrap();
        queue.dead_letter(claimed, "empty content".into(), now).unwrap();

        let dls = queue.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, job_id);
        assert_eq!(queue.list_for_content(content_id).unwrap().len(), 1);
        assert!(matches!(
            queue.get(job_id).unwrap().unwrap().status,
            JobStatus::DeadLettered { .. }
        ));

        let retried = queue.retry_dead_letter(job_id, now).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempt, 0);
        assert!(queue.list_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn stalled_jobs_are_redelivered() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();
        queue.enqueue(parse_job(Lane::AiProcessing, now)).unwrap();
        queue.claim_next(Lane::AiProcessing, now).unwrap().unwrap();

        assert_eq!(queue.requeue_stalled(Duration::minutes(10), now + Duration::minutes(1)).unwrap(), 0);
        assert_eq!(queue.requeue_stalled(Duration::minutes(10), now + Duration::minutes(10)).unwrap(), 1);

        let redelivered = queue
            .claim_next(Lane::AiProcessing, now + Duration::minutes(10))
            .unwrap()
            .unwrap();
        assert_eq!(redelivered.attempt, 2);
    }

    #[test]
    fn stats_tracking() {
        let queue = InMemoryJobQueue::new();
        let now = Utc::now();

        for _ in 0..5 {
            queue.enqueue(parse_job(Lane::AiProcessing, now)).unwrap();
        }
        queue.enqueue(parse_job(Lane::AiProcessingHigh, now)).unwrap();

        queue.claim_next(Lane::AiProcessing, now).unwrap();
        queue.claim_next(Lane::AiProcessing, now).unwrap();

        let stats = queue.stats(Some(Lane::AiProcessing)).unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 2);
        assert_eq!(queue.stats(None).unwrap().pending, 4);
    }
}
