//! Tests for per-provider retry and its interplay with fallback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use huginn::providers::RetryingAdapter;
use huginn::{
    Capability, Content, FailureKind, GenerationGateway, GenerationRequest, Huginn, Outcome,
    ProviderAdapter, ProviderDescriptor, ProviderFailure, RateLimitConfig, RetryConfig,
};

/// Fails with `kind` for the first `failures` calls, then succeeds.
struct FlakyAdapter {
    name: &'static str,
    kind: FailureKind,
    failures: u32,
    retry_after: Option<Duration>,
    call_count: AtomicU32,
}

impl FlakyAdapter {
    fn new(name: &'static str, kind: FailureKind, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            failures,
            retry_after: None,
            call_count: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProviderAdapter for FlakyAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        let call = self.call_count.fetch_add(1, Ordering::Relaxed);
        if call < self.failures {
            Outcome::Failure(
                ProviderFailure::new(self.kind, "flaky").with_retry_after(self.retry_after),
            )
        } else {
            Outcome::Success(Content::text(format!("from-{}", self.name)))
        }
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .jitter(false)
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let inner = FlakyAdapter::new("flaky", FailureKind::Unavailable, 2);
    let adapter = RetryingAdapter::new(inner.clone(), fast_retry(3));

    let outcome = adapter.invoke(&GenerationRequest::text("x")).await;
    assert_eq!(outcome, Outcome::Success(Content::text("from-flaky")));
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let inner = FlakyAdapter::new("auth", FailureKind::Authentication, 5);
    let adapter = RetryingAdapter::new(inner.clone(), fast_retry(3));

    let outcome = adapter.invoke(&GenerationRequest::text("x")).await;
    assert!(matches!(outcome, Outcome::Failure(ref f) if f.kind == FailureKind::Authentication));
    assert_eq!(inner.calls(), 1);
}

#[tokio::test]
async fn exhausted_retries_return_the_last_failure() {
    let inner = FlakyAdapter::new("down", FailureKind::Network, 10);
    let adapter = RetryingAdapter::new(inner.clone(), fast_retry(3));

    let outcome = adapter.invoke(&GenerationRequest::text("x")).await;
    assert!(matches!(outcome, Outcome::Failure(ref f) if f.kind == FailureKind::Network));
    assert_eq!(inner.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_sets_the_delay() {
    let inner = Arc::new(FlakyAdapter {
        name: "limited",
        kind: FailureKind::RateLimited,
        failures: 1,
        retry_after: Some(Duration::from_secs(7)),
        call_count: AtomicU32::new(0),
    });
    let adapter = RetryingAdapter::new(
        inner.clone(),
        fast_retry(2).max_delay(Duration::from_secs(10)),
    );

    let start = tokio::time::Instant::now();
    let outcome = adapter.invoke(&GenerationRequest::text("x")).await;
    assert!(matches!(outcome, Outcome::Success(_)));
    assert!(start.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn oversized_retry_after_hint_is_capped() {
    let inner = Arc::new(FlakyAdapter {
        name: "limited",
        kind: FailureKind::RateLimited,
        failures: 1,
        retry_after: Some(Duration::from_secs(3_600)),
        call_count: AtomicU32::new(0),
    });
    let adapter = RetryingAdapter::new(
        inner.clone(),
        fast_retry(2).max_delay(Duration::from_secs(2)),
    );

    let start = tokio::time::Instant::now();
    let outcome = adapter.invoke(&GenerationRequest::text("x")).await;
    assert!(matches!(outcome, Outcome::Success(_)));
    assert_eq!(inner.call_count.load(Ordering::Relaxed), 2);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3_600), "{elapsed:?}");
}

#[tokio::test]
async fn gateway_retries_each_provider_before_falling_back() {
    let primary = FlakyAdapter::new("primary", FailureKind::Timeout, u32::MAX);
    let backup = FlakyAdapter::new("backup", FailureKind::Timeout, 0);
    let gateway = Huginn::builder()
        .rate_limit(RateLimitConfig::disabled())
        .retry(fast_retry(3))
        .provider(
            ProviderDescriptor::new("primary", [Capability::Text]).priority(1),
            primary.clone(),
        )
        .provider(
            ProviderDescriptor::new("backup", [Capability::Text]).priority(2),
            backup.clone(),
        )
        .build()
        .unwrap();

    let generation = gateway
        .generate(&GenerationRequest::text("x"))
        .await
        .unwrap();
    assert_eq!(generation.provider, "backup");
    assert_eq!(primary.calls(), 3);
    assert_eq!(backup.calls(), 1);
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let config = RetryConfig::new()
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(350))
        .jitter(false);
    assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
}
