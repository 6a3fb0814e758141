use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::analysis::normalize::NormalizerConfig;
use crate::analysis::orchestrator::DEFAULT_MAX_CONCURRENCY;

/// Which hosted model answers assessment requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Anthropic,
    Gemini,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(LlmProvider::Anthropic),
            "gemini" => Ok(LlmProvider::Gemini),
            other => bail!("LLM_PROVIDER must be 'anthropic' or 'gemini', got '{other}'"),
        }
    }
}

/// Admission control applied before each model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimiterKind {
    FixedDelay,
    TokenBucket,
    RedisWindow,
}

impl FromStr for RateLimiterKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed_delay" => Ok(RateLimiterKind::FixedDelay),
            "token_bucket" => Ok(RateLimiterKind::TokenBucket),
            "redis_window" => Ok(RateLimiterKind::RedisWindow),
            other => bail!(
                "RATE_LIMITER must be one of fixed_delay, token_bucket, redis_window, got '{other}'"
            ),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub llm_provider: LlmProvider,
    /// Key for the selected provider only.
    pub llm_api_key: String,
    pub llm_temperature: f32,
    pub llm_max_output_tokens: u32,
    pub llm_max_attempts: u32,
    pub llm_backoff_base: Duration,
    pub rate_limiter: RateLimiterKind,
    pub request_delay: Duration,
    pub rate_limit_per_minute: u32,
    pub redis_url: Option<String>,
    pub max_concurrency: usize,
    pub normalizer: NormalizerConfig,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm_provider: LlmProvider = env_or("LLM_PROVIDER", LlmProvider::Anthropic)?;
        let llm_api_key = match llm_provider {
            LlmProvider::Anthropic => require_env("ANTHROPIC_API_KEY")?,
            LlmProvider::Gemini => require_env("GEMINI_API_KEY")?,
        };

        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            llm_provider,
            llm_api_key,
            llm_temperature: env_or("LLM_TEMPERATURE", 0.3)?,
            llm_max_output_tokens: env_or("LLM_MAX_OUTPUT_TOKENS", 1024)?,
            llm_max_attempts: env_or("LLM_MAX_ATTEMPTS", 3)?,
            llm_backoff_base: Duration::from_millis(env_or("LLM_BACKOFF_BASE_MS", 1000)?),
            rate_limiter: env_or("RATE_LIMITER", RateLimiterKind::FixedDelay)?,
            request_delay: Duration::from_millis(env_or("REQUEST_DELAY_MS", 2000)?),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", 30)?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            max_concurrency: env_or("ANALYSIS_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
            normalizer: NormalizerConfig {
                min_line_length: env_or("NORMALIZE_MIN_LINE_LENGTH", 10)?,
                max_lines: env_or("NORMALIZE_MAX_LINES", 50)?,
                max_chars: env_or("NORMALIZE_MAX_CHARS", 4000)?,
            },
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        if config.llm_max_attempts == 0 {
            bail!("LLM_MAX_ATTEMPTS must be at least 1");
        }
        if config.rate_limiter == RateLimiterKind::RedisWindow && config.redis_url.is_none() {
            bail!("REDIS_URL is required when RATE_LIMITER=redis_window");
        }
        Ok(config)
    }
}

#[cfg(test)]
impl Config {
    /// Defaults matching an empty environment, with placeholder credentials.
    pub(crate) fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/lessonlens_test".to_string(),
            s3_bucket: "lessonlens-test".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            llm_provider: LlmProvider::Anthropic,
            llm_api_key: "test".to_string(),
            llm_temperature: 0.3,
            llm_max_output_tokens: 1024,
            llm_max_attempts: 3,
            llm_backoff_base: Duration::from_millis(1000),
            rate_limiter: RateLimiterKind::FixedDelay,
            request_delay: Duration::ZERO,
            rate_limit_per_minute: 30,
            redis_url: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            normalizer: NormalizerConfig::default(),
            max_upload_bytes: 25 * 1024 * 1024,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Reads and parses `key`, falling back to `default` when unset or blank.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}"))
}
