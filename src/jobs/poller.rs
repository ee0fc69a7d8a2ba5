//! Background worker that drives active jobs to completion.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use super::{JobConfig, JobTracker};
use crate::HuginnError;

/// Periodically polls every active job.
///
/// Each sweep polls all active jobs concurrently, forces `TimedOut` on jobs
/// that spent `max_attempts`, then prunes terminal jobs older than
/// `retention`.
pub struct JobPoller {
    tracker: Arc<JobTracker>,
    config: JobConfig,
}

impl JobPoller {
    pub fn new(tracker: Arc<JobTracker>, config: JobConfig) -> Self {
        Self { tracker, config }
    }

    /// Run one sweep. Returns how many jobs were polled.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> usize {
        let ids = self.tracker.active_ids();
        let polls = ids.iter().map(|&id| async move {
            match self.tracker.poll(id).await {
                Ok(job) if !job.is_terminal() && job.attempts >= self.config.max_attempts => {
                    if let Err(e) = self.tracker.time_out(id) {
                        warn!(job_id = %id, error = %e, "failed to time out job");
                    }
                }
                Ok(_) => {}
                // Cancelled and pruned between listing and polling.
                Err(HuginnError::JobNotFound(_)) => {}
                Err(e) => warn!(job_id = %id, error = %e, "job poll failed"),
            }
        });
        join_all(polls).await;
        self.tracker.prune(self.config.retention);
        if !ids.is_empty() {
            debug!(polled = ids.len(), "job sweep finished");
        }
        ids.len()
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The loop stops on [`PollerHandle::shutdown`] or when the handle is
    /// dropped.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("job poller stopped");
        });
        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a spawned [`JobPoller`].
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the loop to stop and wait for the current sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "job poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
