//! In-memory rate limiter using the token bucket algorithm.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "config")]
use clap::Args;
use murmur_integration::IntegrationType;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::handler::{ErrorKind, Result as HandlerResult};

/// Logging target for rate limiter operations.
const TRACING_TARGET: &str = "murmur_server::service::security::rate_limiter";

/// Source of monotonic time for refills.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Rate limiter key.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    /// Inbound webhook traffic for one integration from one client.
    Inbound {
        integration_type: String,
        client: Option<IpAddr>,
    },
    /// OAuth flow traffic for one integration from one client.
    OAuth {
        integration_type: IntegrationType,
        client: Option<IpAddr>,
    },
}

impl RateLimitKey {
    /// Creates a key for an inbound webhook or identify call.
    ///
    /// The type is kept as the raw path segment so unknown names are limited
    /// too.
    pub fn inbound(integration_type: impl Into<String>, client: Option<IpAddr>) -> Self {
        Self::Inbound {
            integration_type: integration_type.into(),
            client,
        }
    }

    /// Creates a key for an OAuth connect or callback request.
    pub fn oauth(integration_type: IntegrationType, client: Option<IpAddr>) -> Self {
        Self::OAuth {
            integration_type,
            client,
        }
    }
}

/// Token bucket for one key.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Number of tokens available.
    tokens: f64,
    /// Last refill time.
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_rate).min(f64::from(config.capacity));
        self.last_refill = now;
    }

    fn try_consume(&mut self, config: &RateLimitConfig, now: Instant, cost: u32) -> bool {
        self.refill(config, now);

        if self.tokens >= f64::from(cost) {
            self.tokens -= f64::from(cost);
            true
        } else {
            false
        }
    }

    fn is_full(&self, config: &RateLimitConfig, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens + elapsed * config.refill_rate >= f64::from(config.capacity)
    }

    fn time_until_available(&self, config: &RateLimitConfig) -> Duration {
        if self.tokens >= 1.0 || config.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(((1.0 - self.tokens) / config.refill_rate).ceil())
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RateLimitConfig {
    /// Burst size: requests allowed before throttling starts
    #[cfg_attr(
        feature = "config",
        arg(long = "rate-limit-capacity", env = "RATE_LIMIT_CAPACITY", default_value = "60")
    )]
    pub capacity: u32,

    /// Tokens returned to each bucket per second
    #[cfg_attr(
        feature = "config",
        arg(long = "rate-limit-refill", env = "RATE_LIMIT_REFILL", default_value = "1.0")
    )]
    pub refill_rate: f64,

    /// Upper bound on tracked keys
    #[cfg_attr(
        feature = "config",
        arg(long = "rate-limit-max-keys", env = "RATE_LIMIT_MAX_KEYS", default_value = "10000")
    )]
    pub max_keys: usize,
}

impl RateLimitConfig {
    /// Default number of tracked keys.
    pub const DEFAULT_MAX_KEYS: usize = 10_000;

    /// Creates a new rate limit configuration.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            max_keys: Self::DEFAULT_MAX_KEYS,
        }
    }

    /// Creates a configuration for N requests per minute.
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, f64::from(requests) / 60.0)
    }

    /// Caps the number of tracked keys.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// In-memory rate limiter with a bounded key table.
///
/// When the table is full, idle buckets (refilled to capacity) are dropped
/// first, then the least recently refilled one.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<RateLimitKey, TokenBucket>>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a rate limiter on the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a rate limiter on the given clock.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(
            target: TRACING_TARGET,
            capacity = config.capacity,
            refill_rate = config.refill_rate,
            max_keys = config.max_keys,
            "Rate limiter initialized"
        );

        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            config,
            clock,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Checks if a request is allowed for the given key.
    pub async fn check(&self, key: RateLimitKey) -> HandlerResult<()> {
        self.check_with_cost(key, 1).await
    }

    /// Checks if a request with a custom token cost is allowed.
    pub async fn check_with_cost(&self, key: RateLimitKey, cost: u32) -> HandlerResult<()> {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock().await;

        if !buckets.contains_key(&key) && buckets.len() >= self.config.max_keys {
            self.evict(&mut buckets, now);
        }

        let bucket = buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucket::new(self.config.capacity, now));

        if bucket.try_consume(&self.config, now, cost) {
            return Ok(());
        }

        let retry_after = bucket.time_until_available(&self.config);
        tracing::warn!(
            target: TRACING_TARGET,
            key = ?key,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );

        Err(ErrorKind::TooManyRequests.with_context(format!(
            "Rate limit exceeded. Please try again in {} seconds",
            retry_after.as_secs()
        )))
    }

    /// Makes room for one more key.
    fn evict(&self, buckets: &mut HashMap<RateLimitKey, TokenBucket>, now: Instant) {
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_full(&self.config, now));

        if buckets.len() >= self.config.max_keys
            && let Some(oldest) = buckets
                .iter()
                .min_by_key(|(_, bucket)| bucket.last_refill)
                .map(|(key, _)| key.clone())
        {
            buckets.remove(&oldest);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            removed_count = before - buckets.len(),
            remaining_count = buckets.len(),
            "Evicted rate limit buckets"
        );
    }

    /// Resets the rate limit for a specific key.
    pub async fn reset(&self, key: &RateLimitKey) {
        self.buckets.lock().await.remove(key);
    }

    /// Returns the number of tracked keys.
    pub async fn size(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
