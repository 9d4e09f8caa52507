//! FeedbackLearning: feed user corrections into the learning path once.

use std::sync::Arc;

use tracing::debug;

use crate::jobs::{JobPayload, JobType};
use crate::repository::{FeedbackRepository, LearningSink, LearningUpdate};

use super::error::WorkflowError;
use super::executor::{ExecutionContext, ExecutionResult, StageExecutor};

pub struct FeedbackLearningExecutor {
    feedback: Arc<dyn FeedbackRepository>,
    sink: Arc<dyn LearningSink>,
}

impl FeedbackLearningExecutor {
    pub fn new(feedback: Arc<dyn FeedbackRepository>, sink: Arc<dyn LearningSink>) -> Self {
        Self { feedback, sink }
    }
}

impl StageExecutor for FeedbackLearningExecutor {
    fn job_type(&self) -> JobType {
        JobType::FeedbackLearning
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError> {
        let JobPayload::FeedbackLearning { feedback_id } = ctx.job().payload else {
            return Err(WorkflowError::validation("payload is not a feedback learning request"));
        };

        let mut feedback = self
            .feedback
            .get(feedback_id)?
            .ok_or_else(|| WorkflowError::not_found(format!("feedback {feedback_id}")))?;

        if feedback.is_learned() {
            debug!(%feedback_id, "feedback already learned");
            return Ok(ExecutionResult::new().with_output("already_learned", true.into()));
        }

        let entities = feedback.corrected_entities();
        let count = entities.len();
        self.sink.apply(LearningUpdate {
            feedback_id,
            user_id: feedback.user_id,
            content_id: feedback.content_id,
            output_id: feedback.output_id,
            entities,
            learned_at: ctx.now(),
        })?;

        feedback.learned_at = Some(ctx.now());
        self.feedback.save(&feedback)?;

        Ok(ExecutionResult::new().with_output("learned_entities", count.into()))
    }
}
