//! Retry configuration, delay calculation, and the retrying adapter decorator.
//!
//! [`RetryConfig`] controls retry behaviour and [`RetryingAdapter`] wraps any
//! [`ProviderAdapter`] with automatic retry of transient failures. The
//! registry applies the wrapper at registration time, so the fallback chain
//! only moves on once a provider's retries are spent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::traits::ProviderAdapter;
use crate::Result;
use crate::telemetry;
use crate::types::{AsyncHandle, GenerationRequest, Outcome};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// How often, and how patiently, one provider is retried before the
/// fallback chain moves on.
///
/// Only transient failures (`unavailable`, `timeout`, upstream
/// `rate_limited`) are retried. Delays double per attempt up to
/// `max_delay`, which also bounds any `Retry-After` hint the provider sends:
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(3)
///     .initial_delay(Duration::from_secs(2))
///     .jitter(false);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Calls per provider per request, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Ceiling for both the backoff and provider hints.
    pub max_delay: Duration,
    /// Spread each backoff over `[backoff / 2, backoff]`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// One call per provider; failures go straight to the next provider.
    pub fn disabled() -> Self {
        Self::new().max_attempts(1)
    }

    /// Values below 1 are raised to 1.
    pub fn max_attempts(self, attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..self
        }
    }

    pub fn initial_delay(self, initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..self
        }
    }

    pub fn max_delay(self, max_delay: Duration) -> Self {
        Self { max_delay, ..self }
    }

    pub fn jitter(self, jitter: bool) -> Self {
        Self { jitter, ..self }
    }

    /// Whether another call may follow attempt `attempt` (0-indexed).
    pub fn retries_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Backoff for a given attempt (0-indexed), without jitter.
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Delay before the next attempt.
    ///
    /// A provider `retry_after` hint replaces the computed backoff but is
    /// still capped at `max_delay`. Otherwise the backoff is jittered when
    /// jitter is enabled.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let backoff = self.delay_for_attempt(attempt);
        if !self.jitter {
            return backoff;
        }
        let fraction = (Uuid::new_v4().as_u128() % 1_000) as f64 / 1_000.0;
        backoff.mul_f64(0.5 + fraction / 2.0)
    }
}

/// Run an adapter operation, retrying transient failures.
///
/// Success, pending and permanent failures return immediately. The last
/// transient failure is returned once `max_attempts` is spent.
pub(crate) async fn with_retry<F, Fut>(
    config: &RetryConfig,
    provider_name: &str,
    operation: &'static str,
    f: F,
) -> Outcome
where
    F: Fn() -> Fut,
    Fut: Future<Output = Outcome>,
{
    let mut attempt = 0;
    loop {
        let failure = match f().await {
            Outcome::Failure(failure) if failure.is_transient() => failure,
            other => return other,
        };
        if !config.retries_after(attempt) {
            return Outcome::Failure(failure);
        }
        let delay = config.effective_delay(attempt, failure.retry_after);
        metrics::counter!(telemetry::RETRIES_TOTAL,
            "provider" => provider_name.to_owned(),
            "operation" => operation,
        )
        .increment(1);
        warn!(
            provider = provider_name,
            operation,
            attempt = attempt + 1,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "retrying after transient failure"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Decorator that retries an adapter's transient failures.
///
/// Both `invoke` and `check_status` are retried. `cancel` is passed through
/// untouched.
pub struct RetryingAdapter {
    inner: Arc<dyn ProviderAdapter>,
    config: RetryConfig,
}

impl RetryingAdapter {
    pub fn new(inner: Arc<dyn ProviderAdapter>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ProviderAdapter for RetryingAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    async fn invoke(&self, request: &GenerationRequest) -> Outcome {
        with_retry(&self.config, self.inner.name(), "invoke", || {
            self.inner.invoke(request)
        })
        .await
    }

    async fn check_status(&self, handle: &AsyncHandle) -> Outcome {
        with_retry(&self.config, self.inner.name(), "check_status", || {
            self.inner.check_status(handle)
        })
        .await
    }

    async fn cancel(&self, handle: &AsyncHandle) -> Result<()> {
        self.inner.cancel(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5))
            .jitter(false);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_hint_wins() {
        let config = RetryConfig::new();
        assert_eq!(
            config.effective_delay(0, Some(Duration::from_secs(9))),
            Duration::from_secs(9)
        );
    }

    #[test]
    fn retry_after_hint_is_capped_by_max_delay() {
        let config = RetryConfig::new().max_delay(Duration::from_secs(5));
        assert_eq!(
            config.effective_delay(0, Some(Duration::from_secs(90))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn jitter_stays_within_half_to_full_backoff() {
        let config = RetryConfig::new().initial_delay(Duration::from_secs(4));
        for _ in 0..50 {
            let delay = config.effective_delay(0, None);
            assert!(delay >= Duration::from_secs(2), "{delay:?}");
            assert!(delay <= Duration::from_secs(4), "{delay:?}");
        }
    }

    #[test]
    fn disabled_is_single_attempt() {
        let config = RetryConfig::disabled();
        assert_eq!(config.max_attempts, 1);
        assert!(!config.retries_after(0));
    }

    #[test]
    fn attempts_never_drop_below_one() {
        let config = RetryConfig::new().max_attempts(0);
        assert_eq!(config.max_attempts, 1);

        let config = RetryConfig::new().max_attempts(3);
        assert!(config.retries_after(1));
        assert!(!config.retries_after(2));
    }
}
