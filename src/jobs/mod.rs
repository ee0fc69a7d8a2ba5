//! Asynchronous job tracking.
//!
//! Providers that render media (video especially) answer a submission with a
//! task id instead of content. [`JobTracker`] owns those jobs and walks each
//! one to a terminal state by querying the originating adapter.
//! [`JobPoller`] does that in the background so request handling never
//! sleeps.

mod poller;
mod tracker;

use std::time::Duration;

pub use poller::{JobPoller, PollerHandle};
pub use tracker::JobTracker;

/// Polling parameters.
///
/// ```toml
/// [jobs]
/// poll_interval_secs = 30
/// max_attempts = 30
/// status_timeout_secs = 30
/// retention_secs = 3600
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Delay between two status checks of one job. Default: 30s.
    pub poll_interval: Duration,
    /// Status checks before a job is forced to `TimedOut`. Default: 30.
    pub max_attempts: u32,
    /// Budget for one `check_status` call. Default: 30s.
    pub status_timeout: Duration,
    /// How long terminal jobs stay queryable. Default: 1h.
    pub retention: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_attempts: 30,
            status_timeout: Duration::from_secs(30),
            retention: Duration::from_secs(3600),
        }
    }
}

impl JobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}
