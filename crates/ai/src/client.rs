use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::{AiError, AiResponse};

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Intended readers (e.g. "customers", "engineering").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Output format (e.g. "markdown", "bullet_list").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Upper bound on a single provider call.
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            audience: None,
            format: None,
            max_tokens: None,
            temperature: None,
            timeout: default_timeout(),
        }
    }
}

impl GenerateOptions {
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Text generation provider.
///
/// Implementations block until the provider answers; they are expected to honour
/// `options.timeout` (see [`crate::DeadlineClient`] for a wrapper that enforces it).
pub trait AiClient: Send + Sync + 'static {
    /// Provider name recorded in audit rows (e.g. "openai", "anthropic").
    fn provider(&self) -> &str;

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<AiResponse, AiError>;
}

impl<C> AiClient for Arc<C>
where
    C: AiClient + ?Sized,
{
    fn provider(&self) -> &str {
        (**self).provider()
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<AiResponse, AiError> {
        (**self).generate(prompt, options)
    }
}
