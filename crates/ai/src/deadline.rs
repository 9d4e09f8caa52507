//! Enforce `GenerateOptions::timeout` around any client.

use std::sync::{Arc, mpsc};
use std::thread;

use tracing::warn;

use crate::client::{AiClient, GenerateOptions};
use crate::result::{AiError, AiResponse};

/// Wraps a blocking client and converts an elapsed deadline into
/// [`AiError::Timeout`], which callers treat as transient.
///
/// The provider call runs on a helper thread. A call that misses its deadline
/// cannot be interrupted; it finishes in the background and its result is dropped.
pub struct DeadlineClient {
    inner: Arc<dyn AiClient>,
}

impl DeadlineClient {
    pub fn new(inner: Arc<dyn AiClient>) -> Self {
        Self { inner }
    }
}

impl AiClient for DeadlineClient {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<AiResponse, AiError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let inner = self.inner.clone();
        let prompt = prompt.to_string();
        let call_options = options.clone();

        thread::Builder::new()
            .name("ai-provider-call".to_string())
            .spawn(move || {
                let _ = tx.send(inner.generate(&prompt, &call_options));
            })
            .map_err(|e| AiError::Internal(format!("failed to spawn provider call: {e}")))?;

        match rx.recv_timeout(options.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(provider = self.inner.provider(), timeout = ?options.timeout, "provider call exceeded deadline");
                Err(AiError::Timeout(options.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(AiError::Internal("provider call panicked".to_string()))
            }
        }
    }
}
