//! Tests for async job tracking, polling and cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huginn::{
    AsyncHandle, Capability, Content, FailureKind, GenerationGateway, GenerationRequest, Huginn,
    HuginnError, JobConfig, JobPoller, JobState, JobTracker, Outcome, ProviderAdapter,
    ProviderDescriptor, ProviderRegistry, RateLimitConfig, Result,
};

// ============================================================================
// Mock adapter
// ============================================================================

/// Async adapter that replays scripted status answers, then stays pending.
struct ScriptedRenderer {
    statuses: Mutex<VecDeque<Outcome>>,
    status_calls: AtomicU32,
    cancel_calls: AtomicU32,
}

impl ScriptedRenderer {
    fn new(statuses: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            status_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        })
    }

    fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::Relaxed)
    }

    fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedRenderer {
    fn name(&self) -> &str {
        "renderer"
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        Outcome::pending("task-1")
    }

    async fn check_status(&self, handle: &AsyncHandle) -> Outcome {
        assert_eq!(handle.as_str(), "task-1");
        self.status_calls.fetch_add(1, Ordering::Relaxed);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Outcome::pending("task-1"))
    }

    async fn cancel(&self, _handle: &AsyncHandle) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn done() -> Outcome {
    Outcome::Success(Content::media(["https://cdn.example/video.mp4"]))
}

fn tracker_with(renderer: Arc<ScriptedRenderer>) -> Arc<JobTracker> {
    let mut registry = ProviderRegistry::new();
    registry.register(
        ProviderDescriptor::new("renderer", [Capability::Video]),
        renderer,
    );
    Arc::new(JobTracker::new(Arc::new(registry)))
}

// ============================================================================
// Tracker
// ============================================================================

#[tokio::test]
async fn job_walks_to_succeeded() {
    let renderer = ScriptedRenderer::new([
        Outcome::pending("task-1"),
        Outcome::pending("task-1"),
        done(),
    ]);
    let tracker = tracker_with(renderer.clone());
    let job = tracker.register("renderer", AsyncHandle::new("task-1"));
    assert_eq!(job.state, JobState::Pending);

    let first = tracker.poll(job.id).await.unwrap();
    assert_eq!(first.state, JobState::Processing);
    assert_eq!(first.attempts, 1);

    tracker.poll(job.id).await.unwrap();
    let last = tracker.poll(job.id).await.unwrap();
    assert_eq!(last.state, JobState::Succeeded);
    assert_eq!(last.attempts, 3);
    assert_eq!(
        last.result.as_ref().map(|c| c.urls().to_vec()),
        Some(vec!["https://cdn.example/video.mp4".to_string()])
    );
    assert!(last.finished_at.is_some());
}

#[tokio::test]
async fn terminal_job_is_not_polled_again() {
    let renderer = ScriptedRenderer::new([done()]);
    let tracker = tracker_with(renderer.clone());
    let job = tracker.register("renderer", AsyncHandle::new("task-1"));

    tracker.poll(job.id).await.unwrap();
    let again = tracker.poll(job.id).await.unwrap();

    assert_eq!(again.state, JobState::Succeeded);
    assert_eq!(again.attempts, 1);
    assert_eq!(renderer.status_calls(), 1);
}

#[tokio::test]
async fn provider_reported_failure_fails_the_job() {
    let renderer = ScriptedRenderer::new([Outcome::failure(
        FailureKind::Upstream,
        "render crashed",
    )]);
    let tracker = tracker_with(renderer);
    let job = tracker.register("renderer", AsyncHandle::new("task-1"));

    let failed = tracker.poll(job.id).await.unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.error.unwrap().contains("render crashed"));
}

#[tokio::test]
async fn transient_status_failure_keeps_job_in_flight() {
    let renderer = ScriptedRenderer::new([
        Outcome::failure(FailureKind::Network, "connection reset"),
        done(),
    ]);
    let tracker = tracker_with(renderer);
    let job = tracker.register("renderer", AsyncHandle::new("task-1"));

    let shaky = tracker.poll(job.id).await.unwrap();
    assert_eq!(shaky.state, JobState::Processing);
    assert!(shaky.error.is_none());

    let finished = tracker.poll(job.id).await.unwrap();
    assert_eq!(finished.state, JobState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_times_the_job_out() {
    let renderer = ScriptedRenderer::new([]);
    let tracker = tracker_with(renderer.clone());
    let job = tracker.register("renderer", AsyncHandle::new("task-1"));

    let timed_out = tracker
        .poll_until_terminal(job.id, Duration::from_secs(30), 3)
        .await
        .unwrap();

    assert_eq!(timed_out.state, JobState::TimedOut);
    assert_eq!(timed_out.attempts, 3);
    assert_eq!(renderer.status_calls(), 3);
    assert!(timed_out.error.unwrap().contains("3 poll attempts"));
}

#[tokio::test]
async fn cancel_asks_the_provider_and_is_final() {
    let renderer = ScriptedRenderer::new([]);
    let tracker = tracker_with(renderer.clone());
    let job = tracker.register("renderer", AsyncHandle::new("task-1"));

    let cancelled = tracker.cancel(job.id).await.unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert_eq!(renderer.cancel_calls(), 1);

    let err = tracker.cancel(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        HuginnError::InvalidTransition {
            from: JobState::Cancelled,
            to: JobState::Cancelled
        }
    ));

    // Polling a cancelled job leaves it alone.
    let polled = tracker.poll(job.id).await.unwrap();
    assert_eq!(polled.state, JobState::Cancelled);
    assert_eq!(renderer.status_calls(), 0);
}

// ============================================================================
// Poller
// ============================================================================

#[tokio::test]
async fn sweep_polls_active_jobs_and_enforces_the_budget() {
    let renderer = ScriptedRenderer::new([]);
    let tracker = tracker_with(renderer.clone());
    let a = tracker.register("renderer", AsyncHandle::new("task-1"));
    let b = tracker.register("renderer", AsyncHandle::new("task-1"));
    let poller = JobPoller::new(tracker.clone(), JobConfig::new().max_attempts(2));

    assert_eq!(poller.sweep().await, 2);
    assert_eq!(tracker.active_count(), 2);

    assert_eq!(poller.sweep().await, 2);
    assert_eq!(tracker.get(a.id).unwrap().state, JobState::TimedOut);
    assert_eq!(tracker.get(b.id).unwrap().state, JobState::TimedOut);
    assert_eq!(tracker.active_count(), 0);

    assert_eq!(poller.sweep().await, 0);
    assert_eq!(renderer.status_calls(), 4);
}

// ============================================================================
// Through the gateway
// ============================================================================

fn video_gateway(renderer: Arc<ScriptedRenderer>) -> huginn::Gateway {
    Huginn::builder()
        .rate_limit(RateLimitConfig::disabled())
        .jobs(
            JobConfig::new()
                .poll_interval(Duration::from_secs(1))
                .max_attempts(10),
        )
        .provider(
            ProviderDescriptor::new("renderer", [Capability::Video]),
            renderer,
        )
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn gateway_waits_for_a_pending_job() {
    let renderer = ScriptedRenderer::new([Outcome::pending("task-1"), done()]);
    let gateway = video_gateway(renderer);

    let generation = gateway
        .generate(&GenerationRequest::video("waves at dusk"))
        .await
        .unwrap();
    let job_id = generation.job().map(|job| job.id).unwrap();
    assert_eq!(gateway.job_status(job_id).unwrap().state, JobState::Pending);

    let status = gateway.wait_for_job(job_id).await.unwrap();
    assert_eq!(status.state, JobState::Succeeded);
    assert_eq!(status.attempts, 2);
    assert!(status.content.is_some());
}

#[tokio::test]
async fn gateway_poll_and_cancel() {
    let renderer = ScriptedRenderer::new([]);
    let gateway = video_gateway(renderer.clone());

    let generation = gateway
        .generate(&GenerationRequest::video("waves"))
        .await
        .unwrap();
    let job_id = generation.job().map(|job| job.id).unwrap();

    let polled = gateway.poll_job(job_id).await.unwrap();
    assert_eq!(polled.state, JobState::Processing);

    let cancelled = gateway.cancel_job(job_id).await.unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert_eq!(renderer.cancel_calls(), 1);
    assert_eq!(gateway.stats(None).await.active_jobs, 0);
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let gateway = video_gateway(ScriptedRenderer::new([]));
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        gateway.poll_job(id).await,
        Err(HuginnError::JobNotFound(missing)) if missing == id
    ));
}

#[tokio::test(start_paused = true)]
async fn background_poller_finishes_jobs_and_shuts_down() {
    let renderer = ScriptedRenderer::new([Outcome::pending("task-1"), done()]);
    let gateway = video_gateway(renderer);

    let generation = gateway
        .generate(&GenerationRequest::video("waves"))
        .await
        .unwrap();
    let job_id = generation.job().map(|job| job.id).unwrap();

    let handle = gateway.spawn_poller();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.job_status(job_id).unwrap().state, JobState::Succeeded);

    handle.shutdown().await;
}
