//! Async job records and their state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AsyncHandle, Content, Outcome, ProviderFailure};
use crate::{HuginnError, Result};

/// Job identifier (UUID v4).
pub type JobId = Uuid;

/// Lifecycle state of an [`AsyncJob`].
///
/// ```text
/// Pending ──► Processing ──► Succeeded | Failed | TimedOut
///    │            │
///    └────────────┴──► Cancelled
/// ```
///
/// A decisive first poll on a `Pending` job passes through `Processing`
/// before landing in its terminal state. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Processing -> Processing` is allowed: a poll that finds the job still
    /// running records an attempt without changing state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            JobState::Pending => matches!(next, JobState::Processing | JobState::Cancelled),
            JobState::Processing => next != JobState::Pending,
            _ => false,
        }
    }

    /// Whether `next` is reachable directly or by way of `Processing`.
    pub fn can_reach(&self, next: JobState) -> bool {
        self.can_transition_to(next)
            || (*self == JobState::Pending && JobState::Processing.can_transition_to(next))
    }

    /// States entered on the way from `self` to `next`, in order.
    ///
    /// A same-state move enters nothing.
    pub fn path_to(&self, next: JobState) -> Vec<JobState> {
        if *self == next {
            Vec::new()
        } else if self.can_transition_to(next) {
            vec![next]
        } else {
            vec![JobState::Processing, next]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one status check told us about a job.
#[derive(Debug, Clone, PartialEq)]
pub enum PollVerdict {
    /// Still running at the provider.
    Running,
    /// Finished with content.
    Done(Content),
    /// The provider reported the generation failed.
    Failed(ProviderFailure),
    /// The status check itself failed transiently; the job may still be
    /// running, so it stays in flight.
    Inconclusive(ProviderFailure),
}

impl From<Outcome> for PollVerdict {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(content) => PollVerdict::Done(content),
            Outcome::Pending(_) => PollVerdict::Running,
            Outcome::Failure(failure) if failure.is_transient() => {
                PollVerdict::Inconclusive(failure)
            }
            Outcome::Failure(failure) => PollVerdict::Failed(failure),
        }
    }
}

/// A long-running generation tracked to a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncJob {
    pub id: JobId,
    /// Name of the provider that owns the work.
    pub provider: String,
    /// Provider-side task id.
    pub handle: AsyncHandle,
    pub state: JobState,
    /// Status checks performed so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Content, once `Succeeded`.
    pub result: Option<Content>,
    /// Failure description, once `Failed` or `TimedOut`.
    pub error: Option<String>,
}

impl AsyncJob {
    /// A freshly registered job in `Pending`.
    pub fn new(provider: impl Into<String>, handle: AsyncHandle, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            handle,
            state: JobState::Pending,
            attempts: 0,
            created_at: now,
            last_polled_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Fold one status check into the job.
    ///
    /// Returns the state the job moved into, or `None` when the job was
    /// already terminal (the verdict is discarded and nothing changes).
    pub fn apply_poll(&mut self, verdict: PollVerdict, at: DateTime<Utc>) -> Option<JobState> {
        if self.is_terminal() {
            return None;
        }
        self.attempts += 1;
        self.last_polled_at = Some(at);
        let next = match verdict {
            PollVerdict::Running => JobState::Processing,
            PollVerdict::Inconclusive(failure) => {
                tracing::debug!(job_id = %self.id, error = %failure, "status check inconclusive");
                JobState::Processing
            }
            PollVerdict::Done(content) => {
                self.result = Some(content);
                JobState::Succeeded
            }
            PollVerdict::Failed(failure) => {
                self.error = Some(failure.to_string());
                JobState::Failed
            }
        };
        self.enter(next, at);
        Some(next)
    }

    /// Fail a job whose provider cannot be reached at all (e.g. it is no
    /// longer registered).
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.check(JobState::Failed)?;
        self.error = Some(message.into());
        self.enter(JobState::Failed, at);
        Ok(())
    }

    /// Force `TimedOut` after the attempt budget is spent.
    pub fn time_out(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.check(JobState::TimedOut)?;
        self.error = Some(
            HuginnError::JobTimedOut {
                job_id: self.id,
                attempts: self.attempts,
            }
            .to_string(),
        );
        self.enter(JobState::TimedOut, at);
        Ok(())
    }

    /// Move to `Cancelled`.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.check(JobState::Cancelled)?;
        self.enter(JobState::Cancelled, at);
        Ok(())
    }

    fn check(&self, next: JobState) -> Result<()> {
        if self.state.can_reach(next) {
            Ok(())
        } else {
            Err(HuginnError::InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    fn enter(&mut self, next: JobState, at: DateTime<Utc>) {
        if !self.state.can_transition_to(next) && self.state.can_reach(next) {
            self.state = JobState::Processing;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(at);
        }
    }
}
