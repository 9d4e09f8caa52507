//! Jobs: typed payloads, retry policy, lanes, the queue store and lane workers.
//!
//! ## Components
//!
//! - `Job` / `JobPayload`: one variant per workflow stage
//! - `RetryPolicy`: linear backoff by default, dead-letter once exhausted
//! - `QueueRouter`: job type + priority hint -> lane
//! - `JobQueue`: persistence for jobs and the dead-letter list
//! - `LaneWorkerPool`: threads pulling from one lane

pub mod lane;
pub mod store;
pub mod types;
pub mod worker;

pub use lane::{Lane, LaneConfig, QueueRouter, UnknownLane};
pub use store::{InMemoryJobQueue, JobQueue, JobQueueError, JobStats};
pub use types::{
    BackoffStrategy, DeadLetterEntry, FailureDisposition, Job, JobAttemptRecord, JobHandle, JobId,
    JobPayload, JobStatus, JobType, RetryPolicy,
};
pub use worker::{LaneWorkerPool, WorkerStats};
