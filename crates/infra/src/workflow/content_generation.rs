//! AiContentGeneration: prompt the provider and keep an audit row per job.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use brainflow_ai::{AiClient, GenerateOptions};

use crate::jobs::{JobPayload, JobType};
use crate::records::{JobRecord, JobRecordStore, RecordStatus};

use super::error::WorkflowError;
use super::executor::{ExecutionContext, ExecutionResult, StageExecutor};

pub const GENERATED_KEY: &str = "generated_content";

pub struct ContentGenerationExecutor {
    client: Arc<dyn AiClient>,
    records: Arc<dyn JobRecordStore>,
    timeout_cap: Option<Duration>,
}

impl ContentGenerationExecutor {
    pub fn new(client: Arc<dyn AiClient>, records: Arc<dyn JobRecordStore>) -> Self {
        Self {
            client,
            records,
            timeout_cap: None,
        }
    }

    /// Upper bound for any per-job provider timeout.
    pub fn with_timeout_cap(mut self, cap: Duration) -> Self {
        self.timeout_cap = Some(cap);
        self
    }
}

/// Prompt sent to the provider for `content_type`.
pub fn build_prompt(content_type: &str, text: &str, options: &GenerateOptions) -> String {
    let mut prompt = format!(
        "Generate {} from the following content.",
        content_type.replace('_', " ")
    );
    if let Some(audience) = &options.audience {
        prompt.push_str(&format!("\nAudience: {audience}"));
    }
    if let Some(format) = &options.format {
        prompt.push_str(&format!("\nFormat: {format}"));
    }
    prompt.push_str("\n\nContent:\n");
    prompt.push_str(text.trim());
    prompt
}

impl StageExecutor for ContentGenerationExecutor {
    fn job_type(&self) -> JobType {
        JobType::AiContentGeneration
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult, WorkflowError> {
        let JobPayload::AiContentGeneration {
            content_type,
            options,
            ..
        } = &ctx.job().payload
        else {
            return Err(WorkflowError::validation("payload is not a content generation request"));
        };

        let item = ctx.item()?;
        if item.raw_text.trim().is_empty() {
            return Err(WorkflowError::validation("content is empty"));
        }

        let mut options = options.clone();
        if let Some(cap) = self.timeout_cap {
            options.timeout = options.timeout.min(cap);
        }

        let job = ctx.job();
        let now = ctx.now();
        let prompt = build_prompt(content_type, &item.raw_text, &options);
        let options_json =
            serde_json::to_value(&options).map_err(|e| WorkflowError::Storage(e.to_string()))?;

        let record = JobRecord::new(
            job.id,
            self.client.provider(),
            format!("generate:{content_type}"),
            &prompt,
            options_json,
            item.owner,
            now,
        );
        self.records.insert_or_get(record)?;
        self.records
            .update_status(job.id, RecordStatus::Processing, job.attempt, None, now)?;

        match self.client.generate(&prompt, &options) {
            Ok(response) => {
                self.records
                    .update_status(job.id, RecordStatus::Completed, job.attempt, None, now)?;
                debug!(job_id = %job.id, content_type = %content_type, "content generated");

                Ok(ExecutionResult::new().with_output(
                    GENERATED_KEY,
                    serde_json::json!({
                        "content_type": content_type,
                        "text": response.text,
                        "confidence": response.confidence,
                        "provider": self.client.provider(),
                    }),
                ))
            }
            Err(err) => {
                let status = if err.is_transient() && !job.is_final_attempt() {
                    RecordStatus::Retrying
                } else {
                    RecordStatus::Failed
                };
                warn!(
                    job_id = %job.id,
                    attempt = job.attempt,
                    kind = err.kind(),
                    error = %err,
                    "provider call failed"
                );
                self.records
                    .update_status(job.id, status, job.attempt, Some(err.to_string()), now)?;
                Err(err.into())
            }
        }
    }
}
