//! Deterministic providers for tests and local development.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};

use crate::client::{AiClient, GenerateOptions};
use crate::embedder::{Embedder, Embedding};
use crate::result::{AiError, AiResponse};

fn echo(prompt: &str) -> AiResponse {
    AiResponse::new(format!("generated: {prompt}"), 0.5)
}

fn poisoned(what: &str) -> AiError {
    AiError::Internal(format!("{what} lock poisoned"))
}

/// Stateless client that echoes the prompt; the worker default when no
/// provider is configured.
#[derive(Debug, Clone)]
pub struct OfflineAiClient {
    provider: String,
}

impl OfflineAiClient {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl AiClient for OfflineAiClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<AiResponse, AiError> {
        Ok(echo(prompt))
    }
}

/// Client that replays queued outcomes, then echoes the prompt.
///
/// Every prompt is kept for inspection, so this is for tests only.
#[derive(Debug)]
pub struct ScriptedAiClient {
    provider: String,
    outcomes: Mutex<VecDeque<Result<AiResponse, AiError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedAiClient {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            outcomes: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue the outcome of the next unscripted call.
    pub fn push(&self, outcome: Result<AiResponse, AiError>) -> &Self {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }

    pub fn then_ok(self, text: impl Into<String>) -> Self {
        self.push(Ok(AiResponse::new(text, 0.9)));
        self
    }

    pub fn then_err(self, err: AiError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AiClient for ScriptedAiClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<AiResponse, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .map_err(|_| poisoned("prompt log"))?
            .push(prompt.to_string());

        let next = self
            .outcomes
            .lock()
            .map_err(|_| poisoned("outcome queue"))?
            .pop_front();
        next.unwrap_or_else(|| Ok(echo(prompt)))
    }
}

/// Embedder producing stable vectors derived from a SHA-256 of the text.
///
/// Failures can be scripted per text to exercise partial batch behaviour.
/// Embedded texts are only kept after [`HashEmbedder::recording`].
#[derive(Debug)]
pub struct HashEmbedder {
    dimension: usize,
    failures: Mutex<HashMap<String, VecDeque<AiError>>>,
    embedded: Option<Mutex<Vec<String>>>,
    batches: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            failures: Mutex::new(HashMap::new()),
            embedded: None,
            batches: AtomicUsize::new(0),
        }
    }

    /// Keep every successfully embedded text for [`HashEmbedder::embedded`].
    pub fn recording(mut self) -> Self {
        self.embedded = Some(Mutex::new(Vec::new()));
        self
    }

    /// Make the next embedding of `text` fail with `err`.
    pub fn fail_next(&self, text: impl Into<String>, err: AiError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(text.into())
            .or_default()
            .push_back(err);
    }

    /// Texts that were successfully embedded, in call order. Empty unless
    /// recording.
    pub fn embedded(&self) -> Vec<String> {
        self.embedded
            .as_ref()
            .map(|log| log.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Embedding {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| f32::from(digest[i % digest.len()]) / 255.0)
            .collect()
    }
}

impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash-sha256"
    }

    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Embedding, AiError>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let Ok(mut failures) = self.failures.lock() else {
            return texts.iter().map(|_| Err(poisoned("failure script"))).collect();
        };

        texts
            .iter()
            .map(|text| {
                if let Some(err) = failures.get_mut(*text).and_then(VecDeque::pop_front) {
                    return Err(err);
                }
                if let Some(log) = &self.embedded {
                    log.lock()
                        .map_err(|_| poisoned("embedded log"))?
                        .push(text.to_string());
                }
                Ok(self.vector_for(text))
            })
            .collect()
    }
}
