//! Caller-facing results.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AsyncJob, Capability, Content, JobId, JobState};
use crate::HuginnError;

/// Result of [`Gateway::generate`](crate::Gateway::generate).
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Provider that produced (or is producing) the content.
    pub provider: String,
    pub cached: bool,
    pub status: GenerationStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    /// Content is ready.
    Completed(Content),
    /// The provider is still working; poll the job.
    Pending(AsyncJob),
}

impl Generation {
    pub fn content(&self) -> Option<&Content> {
        match &self.status {
            GenerationStatus::Completed(content) => Some(content),
            GenerationStatus::Pending(_) => None,
        }
    }

    pub fn job(&self) -> Option<&AsyncJob> {
        match &self.status {
            GenerationStatus::Pending(job) => Some(job),
            GenerationStatus::Completed(_) => None,
        }
    }
}

/// Flattened response shape for transport layers (HTTP handlers, CLI).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<Generation> for GenerateResponse {
    fn from(generation: Generation) -> Self {
        let (content, async_job_id) = match generation.status {
            GenerationStatus::Completed(content) => (Some(content), None),
            GenerationStatus::Pending(job) => (None, Some(job.id)),
        };
        Self {
            success: true,
            content,
            error: None,
            provider_used: Some(generation.provider),
            cached: generation.cached,
            async_job_id,
            retry_after_secs: None,
        }
    }
}

impl From<HuginnError> for GenerateResponse {
    fn from(err: HuginnError) -> Self {
        Self {
            success: false,
            content: None,
            retry_after_secs: err.retry_after().map(|d| d.as_secs().max(1)),
            error: Some(err.to_string()),
            provider_used: None,
            cached: false,
            async_job_id: None,
        }
    }
}

/// Snapshot of an async job for callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub provider: String,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&AsyncJob> for JobStatus {
    fn from(job: &AsyncJob) -> Self {
        Self {
            job_id: job.id,
            provider: job.provider.clone(),
            state: job.state,
            attempts: job.attempts,
            content: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

/// Operational snapshot returned by [`Gateway::stats`](crate::Gateway::stats).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStats {
    /// Requests the caller may still make in the current window.
    pub rate_limit_remaining: u64,
    pub rate_limit_ceiling: u64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Configured providers per capability, in trial order.
    pub providers: BTreeMap<Capability, Vec<String>>,
    /// Jobs not yet terminal.
    pub active_jobs: usize,
    /// Invocation latency per provider that has been called at least once.
    pub latency: BTreeMap<String, LatencySnapshot>,
}

/// Latency figures for one provider, as reported in gateway stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySnapshot {
    /// Invocations observed so far.
    pub samples: u64,
    /// Exponentially smoothed mean, in milliseconds.
    pub mean_ms: u64,
    pub last_ms: u64,
    pub max_ms: u64,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::types::AsyncHandle;

    #[test]
    fn pending_generation_flattens_to_job_id() {
        let job = AsyncJob::new("kie", AsyncHandle::new("t1"), Utc::now());
        let id = job.id;
        let response = GenerateResponse::from(Generation {
            provider: "kie".into(),
            cached: false,
            status: GenerationStatus::Pending(job),
        });
        assert!(response.success);
        assert_eq!(response.async_job_id, Some(id));
        assert!(response.content.is_none());
    }

    #[test]
    fn rate_limit_error_carries_retry_after() {
        let response = GenerateResponse::from(HuginnError::RateLimited {
            retry_after: Some(Duration::from_secs(42)),
        });
        assert!(!response.success);
        assert_eq!(response.retry_after_secs, Some(42));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("content").is_none());
    }
}
