//! Gateway - the assembled orchestration engine

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::Orchestrator;
use crate::jobs::{JobConfig, JobPoller, JobTracker, PollerHandle};
use crate::providers::ProviderRegistry;
use crate::traits::GenerationGateway;
use crate::types::{
    Capability, GLOBAL_CALLER, GatewayStats, Generation, GenerationRequest, GenerationStatus,
    JobId, JobStatus, Outcome, ProviderResult,
};
use crate::{HuginnError, Result};

/// Orchestrator plus job tracking, as handed to callers.
///
/// Built with [`Huginn::builder()`](crate::Huginn::builder). A request that
/// lands on an asynchronous provider returns as soon as the provider accepts
/// it; the job is registered here and reported back by id. Drive it with
/// [`poll_job`](GenerationGateway::poll_job), [`wait_for_job`](Self::wait_for_job)
/// or a background [`spawn_poller`](Self::spawn_poller).
pub struct Gateway {
    orchestrator: Orchestrator,
    jobs: Arc<JobTracker>,
    job_config: JobConfig,
}

impl Gateway {
    pub(crate) fn new(
        orchestrator: Orchestrator,
        jobs: Arc<JobTracker>,
        job_config: JobConfig,
    ) -> Self {
        Self {
            orchestrator,
            jobs,
            job_config,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.orchestrator.registry()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn jobs(&self) -> &Arc<JobTracker> {
        &self.jobs
    }

    pub fn job_config(&self) -> &JobConfig {
        &self.job_config
    }

    /// Poll a job until it is terminal, using the configured interval and
    /// attempt budget.
    pub async fn wait_for_job(&self, id: JobId) -> Result<JobStatus> {
        let job = self
            .jobs
            .poll_until_terminal(id, self.job_config.poll_interval, self.job_config.max_attempts)
            .await?;
        Ok(JobStatus::from(&job))
    }

    /// Start a background poller over this gateway's jobs.
    pub fn spawn_poller(&self) -> PollerHandle {
        JobPoller::new(self.jobs.clone(), self.job_config.clone()).spawn()
    }

    /// Drop every cached generation.
    pub async fn purge_cache(&self) -> Result<()> {
        self.orchestrator.cache().purge_all().await
    }
}

#[async_trait]
impl GenerationGateway for Gateway {
    #[instrument(skip(self, request), fields(capability = %request.capability))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let ProviderResult {
            provider,
            outcome,
            cached,
        } = self.orchestrator.generate(request).await?;
        let status = match outcome {
            Outcome::Success(content) => GenerationStatus::Completed(content),
            Outcome::Pending(handle) => {
                GenerationStatus::Pending(self.jobs.register(&provider, handle))
            }
            // Never produced by the orchestrator.
            Outcome::Failure(failure) => {
                return Err(HuginnError::AllProvidersFailed {
                    provider,
                    message: failure.to_string(),
                });
            }
        };
        Ok(Generation {
            provider,
            cached,
            status,
        })
    }

    async fn poll_job(&self, id: JobId) -> Result<JobStatus> {
        let job = self.jobs.poll(id).await?;
        Ok(JobStatus::from(&job))
    }

    fn job_status(&self, id: JobId) -> Result<JobStatus> {
        let job = self.jobs.get(id)?;
        Ok(JobStatus::from(&job))
    }

    async fn cancel_job(&self, id: JobId) -> Result<JobStatus> {
        let job = self.jobs.cancel(id).await?;
        Ok(JobStatus::from(&job))
    }

    async fn stats(&self, caller: Option<&str>) -> GatewayStats {
        let limiter = self.orchestrator.limiter();
        let cache = self.orchestrator.cache();
        let registry = self.registry();
        let providers: BTreeMap<Capability, Vec<String>> = Capability::ALL
            .into_iter()
            .map(|capability| (capability, registry.provider_names(capability)))
            .collect();
        GatewayStats {
            rate_limit_remaining: limiter.remaining(caller.unwrap_or(GLOBAL_CALLER)).await,
            rate_limit_ceiling: limiter.config().max_requests,
            cache_enabled: cache.is_enabled(),
            cache_ttl_secs: cache.ttl().as_secs(),
            providers,
            active_jobs: self.jobs.active_count(),
            latency: registry.latencies(),
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("orchestrator", &self.orchestrator)
            .field("jobs", &self.jobs)
            .field("job_config", &self.job_config)
            .finish()
    }
}
