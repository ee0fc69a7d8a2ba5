//! Per-caller fixed-window rate limiting.
//!
//! Each caller (or the shared `global` key for anonymous requests) gets a
//! counter per wall-clock-aligned window. The counter lives in the shared
//! [`KeyValueStore`], whose increment-with-ceiling is atomic, so concurrent
//! requests can never push a caller past the ceiling.
//!
//! The limiter fails closed: if the store cannot be reached the request is
//! denied.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument};

use crate::store::KeyValueStore;

/// Key prefix for rate-limit counters.
pub const RATE_KEY_PREFIX: &str = "huginn:rate:";

/// Rate-limit ceiling and window.
///
/// ```rust
/// # use huginn::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::new()
///     .max_requests(5)
///     .window(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether limiting applies at all. Default: true.
    pub enabled: bool,
    /// Requests admitted per caller per window. Default: 30.
    pub max_requests: u64,
    /// Window length. Default: 60s.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that admits everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn max_requests(mut self, n: u64) -> Self {
        self.max_requests = n;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u64,
    /// When a denied caller may try again, if known.
    pub retry_after: Option<Duration>,
}

/// Fixed-window limiter over a [`KeyValueStore`].
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn key(caller: &str) -> String {
        format!("{RATE_KEY_PREFIX}{caller}")
    }

    /// Count one request against `caller` and report whether it is admitted.
    #[instrument(skip(self))]
    pub async fn check(&self, caller: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision {
                allowed: true,
                remaining: self.config.max_requests,
                retry_after: None,
            };
        }
        let admission = self
            .store
            .increment_with_ceiling(
                &Self::key(caller),
                self.config.max_requests,
                self.config.window,
            )
            .await;
        match admission {
            Ok(admission) => {
                let remaining = self.config.max_requests.saturating_sub(admission.count);
                if !admission.accepted {
                    debug!(count = admission.count, "rate limit reached");
                }
                RateLimitDecision {
                    allowed: admission.accepted,
                    remaining,
                    retry_after: (!admission.accepted).then_some(admission.resets_in),
                }
            }
            Err(e) => {
                error!(error = %e, "rate limit store unavailable, denying request");
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after: None,
                }
            }
        }
    }

    /// Count one request; `true` if admitted.
    pub async fn try_acquire(&self, caller: &str) -> bool {
        self.check(caller).await.allowed
    }

    /// Requests `caller` may still make this window, without counting one.
    pub async fn remaining(&self, caller: &str) -> u64 {
        if !self.config.enabled {
            return self.config.max_requests;
        }
        match self
            .store
            .window_count(&Self::key(caller), self.config.window)
            .await
        {
            Ok(window) => self.config.max_requests.saturating_sub(window.count),
            Err(e) => {
                error!(caller, error = %e, "rate limit store unavailable");
                0
            }
        }
    }

    /// Clear a caller's counter.
    pub async fn reset(&self, caller: &str) -> crate::Result<()> {
        self.store.delete(&Self::key(caller)).await
    }
}
