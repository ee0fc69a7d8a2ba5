//! The fallback orchestrator: rate limit, cache, then ordered provider trial.
//!
//! ```text
//! generate(request)
//!   │
//!   ├─ RateLimiter::check(caller) ── denied ──► Err(RateLimited)
//!   │
//!   ├─ ResponseCache::lookup ─────── hit ─────► Ok(result, cached = true)
//!   │
//!   ├─ registry.providers_for_preferring ─ empty ─► Err(NoProviderConfigured)
//!   │
//!   └─ for provider in chain (strictly sequential):
//!        Success  ──► cache, return
//!        Pending  ──► return (never cached)
//!        Failure  ──► warn, next
//!      exhausted ──► Err(AllProvidersFailed { last failure })
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::providers::{ProviderRegistry, RegisteredProvider};
use crate::ratelimit::RateLimiter;
use crate::telemetry;
use crate::types::{FailureKind, GenerationRequest, Outcome, ProviderFailure, ProviderResult};
use crate::{HuginnError, Result};

/// Default budget for one adapter call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Routes one request through rate limiting, the cache and the provider
/// fallback chain.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    cache: ResponseCache,
    limiter: RateLimiter,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: ResponseCache,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            registry,
            cache,
            limiter,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Budget for each adapter call; an elapsed call counts as a `Timeout`
    /// failure and the chain moves on.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Produce a result for `request`.
    ///
    /// Returns content (possibly from cache) or a pending handle from the
    /// first provider that did not fail.
    #[instrument(
        skip(self, request),
        fields(capability = %request.capability, caller = request.caller_key())
    )]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<ProviderResult> {
        let decision = self.limiter.check(request.caller_key()).await;
        if !decision.allowed {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL,
                "capability" => request.capability.as_str(),
            )
            .increment(1);
            info!(retry_after = ?decision.retry_after, "request rate limited");
            return Err(HuginnError::RateLimited {
                retry_after: decision.retry_after,
            });
        }

        let use_cache = request.cacheable && self.cache.is_enabled();
        if use_cache && let Some(hit) = self.cache.lookup(request).await {
            return Ok(hit);
        }

        let chain = self
            .registry
            .providers_for_preferring(request.capability, request.preferred_provider.as_deref());
        if chain.is_empty() {
            error!("no provider configured for capability");
            return Err(HuginnError::NoProviderConfigured(request.capability));
        }

        let requested = request.payload.duration();
        let mut last_failure: Option<(String, ProviderFailure)> = None;
        for provider in chain {
            let name = provider.name();
            if !provider.descriptor.accepts_duration(requested) {
                let failure = ProviderFailure::new(
                    FailureKind::Unsupported,
                    format!(
                        "requested duration {:?} exceeds limit {:?}",
                        requested.unwrap_or_default(),
                        provider.descriptor.max_duration.unwrap_or_default()
                    ),
                );
                debug!(provider = name, "skipping provider: {failure}");
                last_failure = Some((name.to_owned(), failure));
                continue;
            }

            match self.attempt(provider, request).await {
                Outcome::Success(content) if content.is_empty() => {
                    let failure = ProviderFailure::new(
                        FailureKind::EmptyResponse,
                        "provider returned no content",
                    );
                    warn!(provider = name, "provider returned empty content, trying next");
                    last_failure = Some((name.to_owned(), failure));
                }
                Outcome::Success(content) => {
                    let result = ProviderResult::new(name, Outcome::Success(content));
                    if use_cache {
                        self.cache.store(request, &result).await;
                    }
                    info!(provider = name, "generation succeeded");
                    return Ok(result);
                }
                Outcome::Pending(handle) => {
                    info!(provider = name, handle = %handle, "provider started async job");
                    return Ok(ProviderResult::new(name, Outcome::Pending(handle)));
                }
                Outcome::Failure(failure) => {
                    warn!(
                        provider = name,
                        kind = %failure.kind,
                        error = %failure.message,
                        "provider failed, trying next"
                    );
                    last_failure = Some((name.to_owned(), failure));
                }
            }
        }

        metrics::counter!(telemetry::FALLBACK_EXHAUSTED_TOTAL,
            "capability" => request.capability.as_str(),
        )
        .increment(1);
        let Some((provider, failure)) = last_failure else {
            return Err(HuginnError::NoProviderConfigured(request.capability));
        };
        error!(provider = %provider, error = %failure, "all providers failed");
        Err(HuginnError::AllProvidersFailed {
            provider,
            message: failure.to_string(),
        })
    }

    /// One guarded adapter call, with metrics and latency recorded.
    async fn attempt(&self, provider: &RegisteredProvider, request: &GenerationRequest) -> Outcome {
        let start = Instant::now();
        let outcome =
            match tokio::time::timeout(self.call_timeout, provider.adapter.invoke(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::failure(
                    FailureKind::Timeout,
                    HuginnError::ProviderTimeout {
                        provider: provider.name().to_owned(),
                        timeout: self.call_timeout,
                    }
                    .to_string(),
                ),
            };
        provider.latency.record(start.elapsed());
        ProviderRegistry::record_request(
            provider.name(),
            request.capability,
            outcome.status_label(),
            start,
        );
        outcome
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("cache_enabled", &self.cache.is_enabled())
            .field("rate_limit", self.limiter.config())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
