//! Per-provider token bucket rate limiting.
//!
//! Each provider gets an independent bucket. Refill is computed lazily from
//! elapsed time in whole refill intervals, so no background timer is needed
//! and a bucket's state is fully determined by the clock.
//!
//! ```ignore
//! use debate_forge::llm::{BucketConfig, RateLimiter, RateLimiterConfig};
//!
//! let limiter = RateLimiter::new(RateLimiterConfig::default());
//! limiter.acquire("openai", 1).await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::error::ErrorKind;

/// Default bucket capacity.
const DEFAULT_MAX_TOKENS: u32 = 50;

/// Default tokens added per refill interval.
const DEFAULT_REFILL_RATE: u32 = 10;

/// Default refill interval in milliseconds.
const DEFAULT_REFILL_INTERVAL_MS: u64 = 1000;

/// Default ceiling on how long `acquire` may block.
const DEFAULT_MAX_WAIT_MS: u64 = 30_000;

/// Token bucket parameters for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Bucket capacity.
    pub max_tokens: u32,
    /// Tokens added per elapsed interval.
    pub refill_rate: u32,
    /// Length of one refill interval in milliseconds.
    pub refill_interval_ms: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            refill_rate: DEFAULT_REFILL_RATE,
            refill_interval_ms: DEFAULT_REFILL_INTERVAL_MS,
        }
    }
}

impl BucketConfig {
    /// Creates a bucket configuration.
    pub fn new(max_tokens: u32, refill_rate: u32, refill_interval_ms: u64) -> Self {
        Self {
            max_tokens,
            refill_rate,
            refill_interval_ms,
        }
    }

    /// Refill interval as a `Duration`.
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

/// Rate limiter configuration: a default bucket plus per-provider overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Bucket used for providers without an override.
    pub default_bucket: BucketConfig,
    /// Per-provider bucket overrides keyed by provider tag.
    pub providers: HashMap<String, BucketConfig>,
    /// Longest `acquire` may wait before failing, in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_bucket: BucketConfig::default(),
            providers: HashMap::new(),
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl RateLimiterConfig {
    /// Returns the bucket configuration that applies to `provider`.
    pub fn bucket_for(&self, provider: &str) -> BucketConfig {
        self.providers
            .get(provider)
            .copied()
            .unwrap_or(self.default_bucket)
    }

    /// Adds or replaces a provider override.
    pub fn with_provider(mut self, provider: impl Into<String>, bucket: BucketConfig) -> Self {
        self.providers.insert(provider.into(), bucket);
        self
    }

    /// Sets the wait ceiling.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Wait ceiling as a `Duration`.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Errors raised by the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Enough tokens will only be available after the wait ceiling.
    #[error("Rate limit for '{provider}' requires waiting {wait:?}, above the {ceiling:?} ceiling")]
    WaitExceedsCeiling {
        provider: String,
        wait: Duration,
        ceiling: Duration,
    },

    /// The request can never be satisfied by this bucket.
    #[error("Requested {requested} tokens from '{provider}' but bucket capacity is {capacity}")]
    ExceedsCapacity {
        provider: String,
        requested: u32,
        capacity: u32,
    },
}

impl RateLimitError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WaitExceedsCeiling { .. } => ErrorKind::RateLimited,
            Self::ExceedsCapacity { .. } => ErrorKind::Fatal,
        }
    }

    /// How long the caller should wait before trying again, if known.
    pub fn suggested_wait(&self) -> Option<Duration> {
        match self {
            Self::WaitExceedsCeiling { wait, .. } => Some(*wait),
            Self::ExceedsCapacity { .. } => None,
        }
    }

    /// Provider whose bucket raised the error.
    pub fn provider(&self) -> &str {
        match self {
            Self::WaitExceedsCeiling { provider, .. } | Self::ExceedsCapacity { provider, .. } => {
                provider
            }
        }
    }
}

/// Token bucket state for a single provider.
#[derive(Debug, Clone)]
pub struct RateBucket {
    tokens: u32,
    last_refill: Instant,
    config: BucketConfig,
}

impl RateBucket {
    /// Creates a full bucket.
    pub fn new(config: BucketConfig, now: Instant) -> Self {
        Self {
            tokens: config.max_tokens,
            last_refill: now,
            config,
        }
    }

    /// Tokens currently in the bucket (without refilling).
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Effective configuration.
    pub fn config(&self) -> BucketConfig {
        self.config
    }

    /// Adds tokens for every whole interval elapsed since the last refill.
    ///
    /// `last_refill` only advances by the intervals consumed, so a partial
    /// interval carries over to the next refill.
    pub fn refill(&mut self, now: Instant) {
        let interval = self.config.refill_interval();
        if interval.is_zero() {
            self.tokens = self.config.max_tokens;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let intervals = elapsed.as_nanos() / interval.as_nanos();
        if intervals == 0 {
            return;
        }

        let added = intervals.saturating_mul(u128::from(self.config.refill_rate));
        let refilled = (u128::from(self.tokens) + added).min(u128::from(self.config.max_tokens));
        self.tokens = u32::try_from(refilled).unwrap_or(self.config.max_tokens);

        let consumed_nanos = intervals.saturating_mul(interval.as_nanos());
        match u64::try_from(consumed_nanos) {
            Ok(nanos) => self.last_refill += Duration::from_nanos(nanos),
            Err(_) => self.last_refill = now,
        }
    }

    /// Takes `n` tokens if available.
    pub fn try_take(&mut self, n: u32) -> bool {
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Time until `n` tokens will be available, assuming `refill(now)` just ran.
    pub fn wait_for(&self, n: u32, now: Instant) -> Duration {
        if self.tokens >= n {
            return Duration::ZERO;
        }
        if self.config.refill_rate == 0 {
            return Duration::MAX;
        }

        let deficit = n - self.tokens;
        let intervals_needed = deficit.div_ceil(self.config.refill_rate);
        let until_refills = self
            .config
            .refill_interval()
            .saturating_mul(intervals_needed);
        let since_last = now.saturating_duration_since(self.last_refill);
        until_refills.saturating_sub(since_last)
    }

    /// Replaces the configuration, clamping accrued tokens to the new cap.
    pub fn reconfigure(&mut self, config: BucketConfig) {
        self.config = config;
        self.tokens = self.tokens.min(config.max_tokens);
    }
}

type SharedBucket = Arc<tokio::sync::Mutex<RateBucket>>;

/// Per-provider token bucket rate limiter.
///
/// The provider map is guarded by a short-lived `std::sync::Mutex`; each
/// bucket has its own async mutex, held across the refill wait so concurrent
/// acquirers of the same provider are served one at a time. Buckets of
/// different providers never share a lock.
pub struct RateLimiter {
    config: Mutex<RateLimiterConfig>,
    buckets: Mutex<HashMap<String, SharedBucket>>,
}

impl RateLimiter {
    /// Creates a limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config: Mutex::new(config),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> RateLimiterConfig {
        lock(&self.config).clone()
    }

    fn bucket(&self, provider: &str) -> SharedBucket {
        let bucket_config = lock(&self.config).bucket_for(provider);
        let mut buckets = lock(&self.buckets);
        buckets
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(RateBucket::new(
                    bucket_config,
                    Instant::now(),
                )))
            })
            .clone()
    }

    /// Acquires `n` tokens for `provider`, waiting for refills if needed.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::WaitExceedsCeiling` when the required wait is
    /// longer than the configured ceiling, and `RateLimitError::ExceedsCapacity`
    /// when `n` is larger than the bucket can ever hold.
    pub async fn acquire(&self, provider: &str, n: u32) -> Result<(), RateLimitError> {
        let ceiling = lock(&self.config).max_wait();
        let bucket = self.bucket(provider);
        let mut bucket = bucket.lock().await;

        if n > bucket.config().max_tokens {
            return Err(RateLimitError::ExceedsCapacity {
                provider: provider.to_string(),
                requested: n,
                capacity: bucket.config().max_tokens,
            });
        }

        loop {
            let now = Instant::now();
            bucket.refill(now);
            if bucket.try_take(n) {
                return Ok(());
            }

            let wait = bucket.wait_for(n, now);
            if wait > ceiling {
                return Err(RateLimitError::WaitExceedsCeiling {
                    provider: provider.to_string(),
                    wait,
                    ceiling,
                });
            }

            tracing::debug!(
                provider = provider,
                tokens = n,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rate limit refill"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes `n` tokens for `provider` without waiting.
    ///
    /// Returns `false` when the bucket lacks tokens or another caller is
    /// currently waiting on it.
    pub fn try_acquire(&self, provider: &str, n: u32) -> bool {
        let bucket = self.bucket(provider);
        let Ok(mut bucket) = bucket.try_lock() else {
            return false;
        };
        bucket.refill(Instant::now());
        bucket.try_take(n)
    }

    /// Tokens available to `provider` right now, after refilling.
    pub async fn available(&self, provider: &str) -> u32 {
        let bucket = self.bucket(provider);
        let mut bucket = bucket.lock().await;
        bucket.refill(Instant::now());
        bucket.tokens()
    }

    /// Refills every existing bucket to its capacity.
    ///
    /// Buckets are reset in place, so a caller already waiting on one keeps
    /// sharing it with new callers.
    pub async fn reset(&self) {
        let existing: Vec<SharedBucket> = lock(&self.buckets).values().cloned().collect();
        for bucket in existing {
            reset_bucket(&bucket).await;
        }
    }

    /// Refills one provider's bucket to its capacity.
    pub async fn reset_provider(&self, provider: &str) {
        let existing = lock(&self.buckets).get(provider).cloned();
        if let Some(bucket) = existing {
            reset_bucket(&bucket).await;
        }
    }

    /// Replaces the whole configuration.
    ///
    /// Existing buckets adopt their new parameters; accrued tokens are only
    /// clamped to the new capacity.
    pub async fn reconfigure(&self, config: RateLimiterConfig) {
        let existing: Vec<(String, SharedBucket)> = {
            *lock(&self.config) = config.clone();
            lock(&self.buckets)
                .iter()
                .map(|(provider, bucket)| (provider.clone(), bucket.clone()))
                .collect()
        };

        for (provider, bucket) in existing {
            bucket
                .lock()
                .await
                .reconfigure(config.bucket_for(&provider));
        }
    }

    /// Sets the bucket configuration for a single provider.
    pub async fn configure_provider(&self, provider: &str, bucket_config: BucketConfig) {
        let existing = {
            lock(&self.config)
                .providers
                .insert(provider.to_string(), bucket_config);
            lock(&self.buckets).get(provider).cloned()
        };

        if let Some(bucket) = existing {
            bucket.lock().await.reconfigure(bucket_config);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config())
            .field("providers", &lock(&self.buckets).len())
            .finish()
    }
}

async fn reset_bucket(bucket: &SharedBucket) {
    let mut bucket = bucket.lock().await;
    let config = bucket.config();
    *bucket = RateBucket::new(config, Instant::now());
}

/// Locks a std mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
