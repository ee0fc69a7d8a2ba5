//! Huginn error types

use std::time::Duration;

use uuid::Uuid;

use crate::types::{Capability, JobState};

/// Huginn error types
///
/// Expected provider outcomes (a provider failing, a job still running) are
/// not errors: they travel as [`Outcome`](crate::types::Outcome) values.
/// These variants cover orchestration-level failures surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Caller-facing orchestration errors
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("no provider configured for {0}")]
    NoProviderConfigured(Capability),

    /// Every provider in the fallback chain failed. Carries the last failure only.
    #[error("all providers failed, last error from {provider}: {message}")]
    AllProvidersFailed { provider: String, message: String },

    #[error("provider {provider} timed out after {timeout:?}")]
    ProviderTimeout { provider: String, timeout: Duration },

    // Async job errors
    #[error("job {job_id} timed out after {attempts} poll attempts")]
    JobTimedOut { job_id: Uuid, attempts: u32 },

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    // Infrastructure errors
    #[error("store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),
}

impl HuginnError {
    /// Retry hint for `RateLimited` errors, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HuginnError::RateLimited { .. }
                | HuginnError::AllProvidersFailed { .. }
                | HuginnError::ProviderTimeout { .. }
                | HuginnError::Store(_)
        )
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
