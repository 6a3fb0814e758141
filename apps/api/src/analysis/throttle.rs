//! Admission control in front of model calls.
//!
//! `AnalysisPipeline` awaits `RateLimiter::acquire` before every model call.
//! The default `FixedDelay` sleeps a constant interval per call, which bounds
//! the request rate only by task count. `TokenBucket` and `RedisWindow`
//! enforce a real per-minute budget, in-process and across instances.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, RateLimiterKind};

const REDIS_KEY_PREFIX: &str = "lessonlens:llm-window";
const WINDOW: Duration = Duration::from_secs(60);

#[async_trait]
pub trait RateLimiter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Waits until one model call may proceed.
    async fn acquire(&self);
}

/// Builds the limiter selected by `RATE_LIMITER`.
pub fn build_rate_limiter(config: &Config) -> Result<Arc<dyn RateLimiter>> {
    let limiter: Arc<dyn RateLimiter> = match config.rate_limiter {
        RateLimiterKind::FixedDelay => Arc::new(FixedDelay::new(config.request_delay)),
        RateLimiterKind::TokenBucket => Arc::new(TokenBucket::per_minute(config.rate_limit_per_minute)),
        RateLimiterKind::RedisWindow => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required when RATE_LIMITER=redis_window")?;
            let client = redis::Client::open(url)?;
            Arc::new(RedisWindow::new(
                client,
                config.rate_limit_per_minute,
                FixedDelay::new(config.request_delay),
            ))
        }
    };
    info!("Rate limiter: {}", limiter.name());
    Ok(limiter)
}

// ────────────────────────────────────────────────────────────────────────────
// FixedDelay
// ────────────────────────────────────────────────────────────────────────────

/// Sleeps a constant delay before every call.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl RateLimiter for FixedDelay {
    fn name(&self) -> &'static str {
        "fixed_delay"
    }

    async fn acquire(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TokenBucket
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// In-process token bucket. Starts full; refills one token per
/// `refill_every`, up to `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_every: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_every,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// A bucket allowing `per_minute` calls per minute, with bursts of the same size.
    pub fn per_minute(per_minute: u32) -> Self {
        let per_minute = per_minute.max(1);
        Self::new(per_minute, WINDOW / per_minute)
    }

    /// Takes a token if available, otherwise returns how long until one is.
    async fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if !self.refill_every.is_zero() {
            let earned = now.duration_since(state.last_refill).as_secs_f64()
                / self.refill_every.as_secs_f64();
            state.tokens = (state.tokens + earned).min(self.capacity);
        } else {
            state.tokens = self.capacity;
        }
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(self.refill_every.mul_f64(1.0 - state.tokens))
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    async fn acquire(&self) {
        while let Some(wait) = self.try_take().await {
            debug!("Token bucket empty, waiting {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RedisWindow
// ────────────────────────────────────────────────────────────────────────────

/// Fixed one-minute window counted in Redis, shared by every instance.
/// Falls back to `fallback` if Redis cannot be reached.
pub struct RedisWindow {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    limit: u32,
    fallback: FixedDelay,
}

impl RedisWindow {
    pub fn new(client: redis::Client, limit: u32, fallback: FixedDelay) -> Self {
        Self {
            client,
            connection: OnceCell::new(),
            limit: limit.max(1),
            fallback,
        }
    }

    async fn try_acquire(&self) -> redis::RedisResult<Option<Duration>> {
        let mut conn = self
            .connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?
            .clone();

        let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let slot = window_slot(now_ms, WINDOW.as_millis() as u64);
        let key = format!("{REDIS_KEY_PREFIX}:{}", slot.start_ms);

        let count: u64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("PEXPIRE")
                .arg(&key)
                .arg(WINDOW.as_millis() as u64)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        if count <= u64::from(self.limit) {
            Ok(None)
        } else {
            Ok(Some(slot.remaining))
        }
    }
}

#[async_trait]
impl RateLimiter for RedisWindow {
    fn name(&self) -> &'static str {
        "redis_window"
    }

    async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(None) => return,
                Ok(Some(wait)) => {
                    debug!("Redis window exhausted, waiting {}ms", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!("Redis rate limiter unavailable, using fixed delay: {e}");
                    self.fallback.acquire().await;
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowSlot {
    start_ms: u64,
    remaining: Duration,
}

fn window_slot(now_ms: u64, window_ms: u64) -> WindowSlot {
    let start_ms = now_ms - now_ms % window_ms;
    WindowSlot {
        start_ms,
        remaining: Duration::from_millis(start_ms + window_ms - now_ms),
    }
}
