//! The provider adapter contract.
//!
//! Every external generation API is wrapped in one [`ProviderAdapter`]. The
//! orchestrator and job tracker only ever see this trait, so adding a
//! provider means adding an adapter, never touching the core.
//!
//! # Outcomes, not errors
//!
//! Adapters report expected results (content, a provider failure, a job
//! still running) as an [`Outcome`] rather than an `Err`. Failure
//! classification happens once, here, at the adapter boundary: an adapter
//! maps HTTP statuses and known error phrases to a
//! [`FailureKind`](crate::types::FailureKind) so nothing downstream re-parses
//! provider text.
//!
//! # Example
//!
//! ```ignore
//! async fn invoke(&self, request: &GenerationRequest) -> Outcome {
//!     if request.capability != Capability::Video {
//!         return Outcome::failure(FailureKind::Unsupported, "video only");
//!     }
//!     match self.submit(request).await {
//!         Ok(task_id) => Outcome::pending(task_id),
//!         Err(failure) => Outcome::Failure(failure),
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::types::{AsyncHandle, FailureKind, GenerationRequest, Outcome};
use crate::{HuginnError, Result};

/// Uniform interface over one external generation API.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logging, metrics and job ownership.
    fn name(&self) -> &str;

    /// Whether the adapter holds the credentials it needs.
    ///
    /// Unconfigured adapters stay registered but are skipped by routing.
    fn is_configured(&self) -> bool {
        true
    }

    /// Run one generation.
    ///
    /// Synchronous providers return `Success` or `Failure`. Asynchronous
    /// providers return `Pending` with the provider's task id.
    async fn invoke(&self, request: &GenerationRequest) -> Outcome;

    /// Check a task previously returned as `Pending`.
    ///
    /// `Pending` means still running. Only asynchronous providers override
    /// this.
    async fn check_status(&self, handle: &AsyncHandle) -> Outcome {
        let _ = handle;
        Outcome::failure(
            FailureKind::Unsupported,
            format!("{} does not run asynchronous jobs", self.name()),
        )
    }

    /// Abort a running task at the provider, if the API supports it.
    async fn cancel(&self, handle: &AsyncHandle) -> Result<()> {
        let _ = handle;
        Err(HuginnError::NotImplemented("cancel"))
    }
}
