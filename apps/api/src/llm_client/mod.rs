/// LLM Client: the single point of entry for all model calls in LessonLens.
///
/// ARCHITECTURAL RULE: No other module may call a model provider directly.
/// All LLM interactions MUST go through this module.
///
/// The provider is chosen at startup; each provider's model identifier is
/// hardcoded in its transport to prevent drift.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

pub mod anthropic;
pub mod gemini;
pub mod prompts;

pub use anthropic::AnthropicTransport;
pub use gemini::GeminiTransport;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Shared HTTP timeout for provider calls.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Model unavailable: rate limited on all {attempts} attempts")]
    ModelUnavailable { attempts: u32 },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Parameters of one completion call, independent of provider.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A model provider endpoint. Implementations perform exactly one HTTP call
/// per `complete` and report rate limiting as `LlmError::RateLimited`.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    fn model(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;
}

/// How rate-limited calls are retried. `max_attempts` counts every call,
/// including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (0-based): none for the first call, then
    /// base, 2×base, 4×base, ...
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX))
    }
}

/// The single LLM client used by all services in LessonLens.
/// Wraps a provider transport with rate-limit retry and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn CompletionTransport>,
    retry: RetryPolicy,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &'static str {
        self.transport.model()
    }

    /// Makes a raw call to the model, returning its text.
    /// Retries only on rate limiting, with exponential backoff. Any other
    /// failure is returned immediately.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = CompletionRequest {
            system,
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_before(attempt);
                warn!(
                    "LLM call attempt {} was rate limited, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.transport.complete(&request).await {
                Err(LlmError::RateLimited { message }) => {
                    warn!("LLM rate limited ({}): {}", self.transport.model(), message);
                }
                Ok(text) => {
                    debug!("LLM call succeeded on attempt {}", attempt + 1);
                    return Ok(text);
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::ModelUnavailable {
            attempts: self.retry.max_attempts,
        })
    }

    /// Convenience method that calls the LLM and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.call(prompt, system).await?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(&text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// True when a provider response signals rate limiting or quota exhaustion.
pub(crate) fn is_rate_limit(status: u16, body: &str) -> bool {
    status == 429 || body.contains("RESOURCE_EXHAUSTED") || body.contains("rate_limit_error")
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
