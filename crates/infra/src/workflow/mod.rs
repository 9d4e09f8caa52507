//! Stage executors and the seam the scheduler dispatches through.

pub mod brain_dump;
pub mod content_generation;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod feedback_learning;

pub use brain_dump::BrainDumpExecutor;
pub use content_generation::{ContentGenerationExecutor, build_prompt};
pub use embedding::EmbeddingExecutor;
pub use error::WorkflowError;
pub use executor::{ExecutionContext, ExecutionResult, ExecutorRegistry, JobRequest, StageExecutor};
pub use feedback_learning::FeedbackLearningExecutor;
