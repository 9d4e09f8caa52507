//! Infrastructure layer: queue, guard, audit store, repositories and the
//! workflow scheduler that drives content items through the AI stages.

pub mod clock;
pub mod config;
pub mod jobs;
pub mod lease;
pub mod notify;
pub mod records;
pub mod repository;
pub mod scheduler;
pub mod workflow;


pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, WorkerConfig};
pub use notify::WorkflowEventSink;
pub use scheduler::{DispatchOutcome, SchedulerBuilder, WorkflowScheduler};
pub use workflow::WorkflowError;
