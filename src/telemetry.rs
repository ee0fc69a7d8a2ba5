//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "gemini", "kie")
//! - `capability`: generation kind: "text", "image" or "video"
//! - `status`: outcome: "ok", "pending" or "error"
//! - `state`: job state a transition landed in

/// Total adapter invocations dispatched by the orchestrator.
///
/// Labels: `provider`, `capability`, `status` ("ok" | "pending" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Adapter invocation duration in seconds.
///
/// Labels: `provider`, `capability`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total cache hits.
///
/// Labels: `capability`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses.
///
/// Labels: `capability`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Requests rejected by the rate limiter (including store outages).
///
/// Labels: `capability`.
pub const RATE_LIMITED_TOTAL: &str = "huginn_rate_limited_total";

/// Requests that exhausted the whole fallback chain.
///
/// Labels: `capability`.
pub const FALLBACK_EXHAUSTED_TOTAL: &str = "huginn_fallback_exhausted_total";

/// Async job state transitions.
///
/// Labels: `provider`, `state`.
pub const JOB_TRANSITIONS_TOTAL: &str = "huginn_job_transitions_total";

/// Status checks issued against async providers.
///
/// Labels: `provider`.
pub const JOB_POLLS_TOTAL: &str = "huginn_job_polls_total";
