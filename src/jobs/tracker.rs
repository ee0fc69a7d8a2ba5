//! In-memory registry of asynchronous jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::providers::ProviderRegistry;
use crate::telemetry;
use crate::types::{AsyncHandle, AsyncJob, FailureKind, JobId, JobState, Outcome, PollVerdict};
use crate::{HuginnError, Result};

/// Tracks asynchronous jobs from registration to a terminal state.
///
/// Jobs live in a `DashMap`. No map guard is held across an adapter call:
/// `poll` clones a snapshot, awaits the provider, then re-acquires the entry
/// to fold the verdict in. A job that turned terminal meanwhile (a racing
/// poll or a cancel) ignores the late verdict.
pub struct JobTracker {
    jobs: DashMap<JobId, AsyncJob>,
    registry: Arc<ProviderRegistry>,
    clock: Arc<dyn Clock>,
    status_timeout: Duration,
}

impl JobTracker {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            jobs: DashMap::new(),
            registry,
            clock: Arc::new(SystemClock),
            status_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Budget for one `check_status` (and remote `cancel`) call.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Start tracking a provider task. The job begins in `Pending`.
    #[instrument(skip(self), fields(handle = %handle))]
    pub fn register(&self, provider: &str, handle: AsyncHandle) -> AsyncJob {
        let job = AsyncJob::new(provider, handle, self.clock.now());
        record_transition(provider, JobState::Pending);
        info!(job_id = %job.id, provider, "async job registered");
        self.jobs.insert(job.id, job.clone());
        job
    }

    /// Current snapshot of a job.
    pub fn get(&self, id: JobId) -> Result<AsyncJob> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(HuginnError::JobNotFound(id))
    }

    /// Query the originating provider once and fold the answer in.
    ///
    /// Polling a terminal job returns it unchanged without calling the
    /// provider. A job whose provider is no longer registered fails.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn poll(&self, id: JobId) -> Result<AsyncJob> {
        let snapshot = self.get(id)?;
        if snapshot.is_terminal() {
            debug!(state = %snapshot.state, "job already terminal, poll ignored");
            return Ok(snapshot);
        }

        let Some(provider) = self.registry.get(&snapshot.provider) else {
            warn!(provider = %snapshot.provider, "job provider is no longer registered");
            let message = format!("provider {} is no longer registered", snapshot.provider);
            return self.update(id, |job, at| job.fail(message, at));
        };

        let outcome = match tokio::time::timeout(
            self.status_timeout,
            provider.adapter.check_status(&snapshot.handle),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Outcome::failure(
                FailureKind::Timeout,
                HuginnError::ProviderTimeout {
                    provider: snapshot.provider.clone(),
                    timeout: self.status_timeout,
                }
                .to_string(),
            ),
        };
        metrics::counter!(telemetry::JOB_POLLS_TOTAL,
            "provider" => snapshot.provider.clone(),
            "status" => outcome.status_label(),
        )
        .increment(1);

        let verdict = PollVerdict::from(outcome);
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or(HuginnError::JobNotFound(id))?;
        let before = entry.state;
        if let Some(next) = entry.apply_poll(verdict, self.clock.now())
            && next != before
        {
            record_transitions(&entry.provider, before, next);
            log_transition(entry.value(), before);
        }
        Ok(entry.value().clone())
    }

    /// Poll until the job is terminal or `max_attempts` status checks have
    /// been spent, sleeping `interval` in between. An exhausted budget forces
    /// `TimedOut`.
    ///
    /// The budget counts every status check the job has had, including
    /// those made by other pollers.
    pub async fn poll_until_terminal(
        &self,
        id: JobId,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<AsyncJob> {
        loop {
            let job = self.poll(id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
            if job.attempts >= max_attempts {
                return self.time_out(id);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Force `TimedOut`; a no-op returning the job if it is already
    /// terminal.
    pub(crate) fn time_out(&self, id: JobId) -> Result<AsyncJob> {
        self.update(id, |job, at| {
            if job.is_terminal() {
                return Ok(());
            }
            job.time_out(at)
        })
    }

    /// Cancel a job that is still in flight.
    ///
    /// The provider is asked to abort when its adapter supports it; the
    /// local transition to `Cancelled` happens either way. Cancelling a
    /// terminal job is an `InvalidTransition` error.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn cancel(&self, id: JobId) -> Result<AsyncJob> {
        let snapshot = self.get(id)?;
        if snapshot.is_terminal() {
            return Err(HuginnError::InvalidTransition {
                from: snapshot.state,
                to: JobState::Cancelled,
            });
        }

        if let Some(provider) = self.registry.get(&snapshot.provider) {
            let remote =
                tokio::time::timeout(self.status_timeout, provider.adapter.cancel(&snapshot.handle))
                    .await;
            match remote {
                Ok(Ok(())) => debug!("provider accepted cancellation"),
                Ok(Err(HuginnError::NotImplemented(_))) => {
                    debug!("provider has no remote cancel")
                }
                Ok(Err(e)) => warn!(error = %e, "remote cancel failed, cancelling locally"),
                Err(_) => warn!("remote cancel timed out, cancelling locally"),
            }
        }

        self.update(id, |job, at| job.cancel(at))
    }

    /// Ids of jobs not yet terminal.
    pub fn active_ids(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|entry| !entry.is_terminal())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|entry| !entry.is_terminal()).count()
    }

    /// Total jobs held, terminal ones included.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop terminal jobs that finished more than `retention` ago.
    ///
    /// Returns the number of jobs removed.
    pub fn prune(&self, retention: Duration) -> usize {
        let now = self.clock.now();
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return 0;
        };
        let before = self.jobs.len();
        self.jobs.retain(|_, job| match job.finished_at {
            Some(finished) if job.is_terminal() => finished > cutoff,
            _ => true,
        });
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            debug!(removed, "pruned finished jobs");
        }
        removed
    }

    fn update<F>(&self, id: JobId, f: F) -> Result<AsyncJob>
    where
        F: FnOnce(&mut AsyncJob, DateTime<Utc>) -> Result<()>,
    {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or(HuginnError::JobNotFound(id))?;
        let before = entry.state;
        f(entry.value_mut(), self.clock.now())?;
        if entry.state != before {
            record_transitions(&entry.provider, before, entry.state);
            log_transition(entry.value(), before);
        }
        Ok(entry.value().clone())
    }
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("jobs", &self.jobs.len())
            .field("status_timeout", &self.status_timeout)
            .finish()
    }
}

fn record_transition(provider: &str, state: JobState) {
    metrics::counter!(telemetry::JOB_TRANSITIONS_TOTAL,
        "provider" => provider.to_owned(),
        "state" => state.as_str(),
    )
    .increment(1);
}

/// Count every state entered between `from` and `to`.
fn record_transitions(provider: &str, from: JobState, to: JobState) {
    for state in from.path_to(to) {
        record_transition(provider, state);
    }
}

fn log_transition(job: &AsyncJob, from: JobState) {
    match job.state {
        JobState::Failed | JobState::TimedOut => warn!(
            job_id = %job.id,
            provider = %job.provider,
            %from,
            to = %job.state,
            attempts = job.attempts,
            error = job.error.as_deref().unwrap_or_default(),
            "async job did not complete"
        ),
        _ => info!(
            job_id = %job.id,
            provider = %job.provider,
            %from,
            to = %job.state,
            attempts = job.attempts,
            "async job transition"
        ),
    }
}
