//! Provider outcomes: the tagged result of one adapter invocation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Generated text.
    Text { text: String },
    /// Generated media, as URLs to the produced assets.
    Media { urls: Vec<String> },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn media(urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Content::Media {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// The text, for text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            Content::Media { .. } => None,
        }
    }

    /// Media URLs (empty for text content).
    pub fn urls(&self) -> &[String] {
        match self {
            Content::Text { .. } => &[],
            Content::Media { urls } => urls,
        }
    }

    /// Whether the provider produced nothing usable.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text { text } => text.trim().is_empty(),
            Content::Media { urls } => urls.is_empty(),
        }
    }
}

/// Provider-side identifier of a long-running task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AsyncHandle(String);

impl AsyncHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured failure classification, derived once at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or rejected credentials.
    Authentication,
    /// Out of credits, quota or billing problem.
    QuotaExceeded,
    /// The provider throttled us.
    RateLimited,
    /// The call exceeded its timeout.
    Timeout,
    /// Transport-level failure (DNS, connect, reset).
    Network,
    /// Provider-side outage (5xx).
    Unavailable,
    /// The provider rejected the request shape.
    InvalidRequest,
    /// The provider refused the content.
    ContentFiltered,
    /// The provider answered but produced nothing.
    EmptyResponse,
    /// The provider answered with something we could not parse.
    Malformed,
    /// This provider cannot serve this request (capability, duration, ...).
    Unsupported,
    /// The provider reported the generation itself failed.
    Upstream,
}

impl FailureKind {
    /// Whether retrying the same provider may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::RateLimited
                | FailureKind::Timeout
                | FailureKind::Network
                | FailureKind::Unavailable
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Authentication => "authentication",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::Unavailable => "unavailable",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::ContentFiltered => "content_filtered",
            FailureKind::EmptyResponse => "empty_response",
            FailureKind::Malformed => "malformed",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Upstream => "upstream",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-reported failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Provider back-off hint (from `Retry-After`), if any.
    pub retry_after: Option<Duration>,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The provider produced content.
    Success(Content),
    /// The provider failed; the orchestrator may fall back.
    Failure(ProviderFailure),
    /// The provider accepted the work and is still running it.
    Pending(AsyncHandle),
}

impl Outcome {
    /// Shorthand for a failure outcome.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Outcome::Failure(ProviderFailure::new(kind, message))
    }

    /// Shorthand for a pending outcome.
    pub fn pending(handle: impl Into<String>) -> Self {
        Outcome::Pending(AsyncHandle::new(handle))
    }

    /// Metric/log label: "ok", "error" or "pending".
    pub fn status_label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "ok",
            Outcome::Failure(_) => "error",
            Outcome::Pending(_) => "pending",
        }
    }
}

/// An [`Outcome`] tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub provider: String,
    pub outcome: Outcome,
    /// Served from the idempotency cache rather than a provider call.
    pub cached: bool,
}

impl ProviderResult {
    pub fn new(provider: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            provider: provider.into(),
            outcome,
            cached: false,
        }
    }

    /// Content, for successful results.
    pub fn content(&self) -> Option<&Content> {
        match &self.outcome {
            Outcome::Success(content) => Some(content),
            _ => None,
        }
    }

    /// Async handle, for pending results.
    pub fn handle(&self) -> Option<&AsyncHandle> {
        match &self.outcome {
            Outcome::Pending(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, Outcome::Pending(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_serializes_tagged() {
        let json = serde_json::to_value(Content::media(["https://cdn/v.mp4"])).unwrap();
        assert_eq!(json["type"], "media");
        assert_eq!(json["urls"][0], "https://cdn/v.mp4");
    }

    #[test]
    fn blank_text_is_empty() {
        assert!(Content::text("  \n").is_empty());
        assert!(!Content::text("hello").is_empty());
        assert!(Content::media(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn transient_kinds() {
        assert!(FailureKind::Timeout.is_transient());
        assert!(FailureKind::Unavailable.is_transient());
        assert!(!FailureKind::QuotaExceeded.is_transient());
        assert!(!FailureKind::Upstream.is_transient());
    }

    #[test]
    fn failure_display_includes_kind() {
        let failure = ProviderFailure::new(FailureKind::QuotaExceeded, "not enough credits");
        assert_eq!(failure.to_string(), "quota_exceeded: not enough credits");
    }
}
