//! Core GenerationGateway trait

use async_trait::async_trait;

use crate::types::{GatewayStats, GenerateResponse, Generation, GenerationRequest, JobId, JobStatus};
use crate::Result;

/// The caller-facing gateway contract.
///
/// Transport layers (HTTP handlers, queue consumers, the CLI) depend on this
/// trait rather than on [`Gateway`](crate::Gateway), so they can be tested
/// against a stub.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Run a request through rate limiting, the cache and the fallback chain.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;

    /// [`generate`](Self::generate), flattened into a transport-friendly
    /// response. Never fails.
    async fn submit(&self, request: &GenerationRequest) -> GenerateResponse {
        match self.generate(request).await {
            Ok(generation) => generation.into(),
            Err(e) => e.into(),
        }
    }

    /// Check an async job once with its provider.
    async fn poll_job(&self, id: JobId) -> Result<JobStatus>;

    /// Last known state of an async job, without contacting the provider.
    fn job_status(&self, id: JobId) -> Result<JobStatus>;

    /// Cancel an async job that is still running.
    async fn cancel_job(&self, id: JobId) -> Result<JobStatus>;

    /// Operational snapshot for `caller` (`None` is the global caller).
    async fn stats(&self, caller: Option<&str>) -> GatewayStats;
}
