//! Tests for metrics emitted by the orchestrator and job tracker.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use huginn::{
    AsyncHandle, Capability, Content, FailureKind, GenerationGateway, GenerationRequest, Huginn,
    ManualClock, Outcome, ProviderAdapter, ProviderDescriptor, RateLimitConfig, RetryConfig,
    telemetry,
};

// ============================================================================
// Mock adapters
// ============================================================================

struct Writer;

#[async_trait]
impl ProviderAdapter for Writer {
    fn name(&self) -> &str {
        "writer"
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        Outcome::Success(Content::text("words"))
    }
}

struct Broken;

#[async_trait]
impl ProviderAdapter for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        Outcome::failure(FailureKind::Authentication, "bad key")
    }
}

/// Fails once with a transient error, then succeeds.
struct Hiccup(AtomicU32);

#[async_trait]
impl ProviderAdapter for Hiccup {
    fn name(&self) -> &str {
        "hiccup"
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        if self.0.fetch_add(1, Ordering::Relaxed) == 0 {
            Outcome::failure(FailureKind::Unavailable, "warming up")
        } else {
            Outcome::Success(Content::text("ready"))
        }
    }
}

struct Renderer;

#[async_trait]
impl ProviderAdapter for Renderer {
    fn name(&self) -> &str {
        "renderer"
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        Outcome::pending("r-1")
    }

    async fn check_status(&self, _handle: &AsyncHandle) -> Outcome {
        Outcome::Success(Content::media(["https://cdn.example/r-1.mp4"]))
    }
}

// ============================================================================
// Helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counters for `name` whose `label` equals `value`.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the inner async work.
fn recorded<F: std::future::Future>(future: F) -> (F::Output, SnapshotVec) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    });
    (output, snapshotter.snapshot().into_vec())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_call_records_request_and_cache_metrics() {
    let (_, snapshot) = recorded(async {
        let gateway = Huginn::builder()
            .rate_limit(RateLimitConfig::disabled())
            .provider(
                ProviderDescriptor::new("writer", [Capability::Text]),
                Arc::new(Writer),
            )
            .build()
            .unwrap();
        let request = GenerationRequest::text("x");
        gateway.generate(&request).await.unwrap();
        gateway.generate(&request).await.unwrap();
    });

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "ok"),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn exhausted_chain_records_fallback_metric() {
    let (result, snapshot) = recorded(async {
        let gateway = Huginn::builder()
            .rate_limit(RateLimitConfig::disabled())
            .provider(
                ProviderDescriptor::new("broken", [Capability::Text]),
                Arc::new(Broken),
            )
            .build()
            .unwrap();
        gateway.generate(&GenerationRequest::text("x")).await
    });

    assert!(result.is_err());
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "error"),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::FALLBACK_EXHAUSTED_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn denied_request_records_rate_limit_metric() {
    let (_, snapshot) = recorded(async {
        let gateway = Huginn::builder()
            .clock(Arc::new(ManualClock::at_millis(0)))
            .rate_limit(RateLimitConfig::new().max_requests(1))
            .provider(
                ProviderDescriptor::new("writer", [Capability::Text]),
                Arc::new(Writer),
            )
            .build()
            .unwrap();
        let request = GenerationRequest::text("x").cacheable(false);
        let _ = gateway.generate(&request).await;
        let _ = gateway.generate(&request).await;
    });

    assert_eq!(counter_total(&snapshot, telemetry::RATE_LIMITED_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn job_polls_and_transitions_are_counted() {
    let (_, snapshot) = recorded(async {
        let gateway = Huginn::builder()
            .rate_limit(RateLimitConfig::disabled())
            .provider(
                ProviderDescriptor::new("renderer", [Capability::Video]),
                Arc::new(Renderer),
            )
            .build()
            .unwrap();
        let generation = gateway
            .generate(&GenerationRequest::video("x"))
            .await
            .unwrap();
        let job_id = generation.job().map(|job| job.id).unwrap();
        gateway.poll_job(job_id).await.unwrap();
    });

    assert_eq!(counter_total(&snapshot, telemetry::JOB_POLLS_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::JOB_TRANSITIONS_TOTAL, "state", "pending"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::JOB_TRANSITIONS_TOTAL, "state", "succeeded"),
        1
    );
    // A decisive first poll still passes through processing.
    assert_eq!(
        counter_with_label(&snapshot, telemetry::JOB_TRANSITIONS_TOTAL, "state", "processing"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn transient_failure_records_a_retry() {
    let (_, snapshot) = recorded(async {
        let gateway = Huginn::builder()
            .rate_limit(RateLimitConfig::disabled())
            .retry(
                RetryConfig::new()
                    .max_attempts(2)
                    .initial_delay(Duration::from_millis(1))
                    .jitter(false),
            )
            .provider(
                ProviderDescriptor::new("hiccup", [Capability::Text]),
                Arc::new(Hiccup(AtomicU32::new(0))),
            )
            .build()
            .unwrap();
        gateway
            .generate(&GenerationRequest::text("x"))
            .await
            .unwrap();
    });

    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::RETRIES_TOTAL, "operation", "invoke"),
        1
    );
    // The retried call is one request from the orchestrator's point of view.
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    let gateway = Huginn::builder()
        .provider(
            ProviderDescriptor::new("writer", [Capability::Text]),
            Arc::new(Writer),
        )
        .build()
        .unwrap();
    gateway
        .generate(&GenerationRequest::text("x"))
        .await
        .unwrap();
}
