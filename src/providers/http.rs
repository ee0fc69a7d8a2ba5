//! Shared HTTP plumbing for the provider adapters.
//!
//! Every adapter sends JSON over reqwest and classifies what comes back the
//! same way:
//!
//! | Response                                | FailureKind        |
//! |-----------------------------------------|--------------------|
//! | 4xx mentioning quota/credits/billing    | `QuotaExceeded`    |
//! | 401, 403                                | `Authentication`   |
//! | 402                                     | `QuotaExceeded`    |
//! | 429                                     | `RateLimited`      |
//! | 408, 504                                | `Timeout`          |
//! | other 5xx                               | `Unavailable`      |
//! | 400 mentioning safety/content policy    | `ContentFiltered`  |
//! | other 4xx                               | `InvalidRequest`   |
//! | connect/reset                           | `Network`          |
//! | client timeout                          | `Timeout`          |
//! | unparseable body                        | `Malformed`        |

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::types::{FailureKind, ProviderFailure};

/// Client-side timeout for adapters built without an explicit client.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a reqwest client with the given request timeout.
pub fn client_with_timeout(timeout: Duration) -> crate::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| crate::HuginnError::Http(e.to_string()))
}

/// Client used by adapter `new()` constructors.
pub(crate) fn default_client() -> Client {
    client_with_timeout(DEFAULT_HTTP_TIMEOUT).unwrap_or_default()
}

/// Send a request and decode a successful JSON body into `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, ProviderFailure> {
    let response = request.send().await.map_err(|e| transport_failure(&e))?;
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body = response.text().await.map_err(|e| transport_failure(&e))?;
    if !status.is_success() {
        return Err(status_failure(status, retry_after, &body));
    }
    serde_json::from_str(&body).map_err(|e| {
        ProviderFailure::new(FailureKind::Malformed, format!("unexpected response body: {e}"))
    })
}

/// Classify a reqwest transport error.
pub(crate) fn transport_failure(err: &reqwest::Error) -> ProviderFailure {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() {
        FailureKind::Malformed
    } else {
        FailureKind::Network
    };
    ProviderFailure::new(kind, err.to_string())
}

/// Classify a non-success HTTP response.
pub(crate) fn status_failure(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderFailure {
    let message = error_message(body)
        .map(|m| format!("HTTP {}: {m}", status.as_u16()))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let kind = classify_status(status, &message);
    let retry_after = (kind == FailureKind::RateLimited).then_some(retry_after).flatten();
    ProviderFailure::new(kind, message).with_retry_after(retry_after)
}

/// Map an HTTP status plus the provider's error message to a failure kind.
pub fn classify_status(status: StatusCode, message: &str) -> FailureKind {
    if status.is_client_error() && mentions_quota(message) {
        return FailureKind::QuotaExceeded;
    }
    match status.as_u16() {
        401 | 403 => FailureKind::Authentication,
        402 => FailureKind::QuotaExceeded,
        429 => FailureKind::RateLimited,
        408 | 504 => FailureKind::Timeout,
        400 if mentions_content_policy(message) => FailureKind::ContentFiltered,
        s if (500..600).contains(&s) => FailureKind::Unavailable,
        _ => FailureKind::InvalidRequest,
    }
}

/// Whether a provider message describes an exhausted quota or balance.
pub fn mentions_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["quota", "credits", "billing", "not enough", "insufficient"]
        .iter()
        .any(|phrase| lower.contains(phrase))
}

fn mentions_content_policy(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["safety", "content policy", "moderation"]
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Pull a human-readable message out of a JSON error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}`, `{"msg": ..}` and `{"detail": ..}`. Falls back to a
/// truncated raw body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            json.pointer("/error/message"),
            json.get("error"),
            json.get("message"),
            json.get("msg"),
            json.get("detail"),
        ];
        if let Some(message) = candidates.into_iter().flatten().find_map(|v| v.as_str()) {
            return Some(message.to_owned());
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(200).collect())
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Trim a trailing slash so `format!("{base}/path")` never doubles it.
pub(crate) fn normalize_base_url(base_url: impl Into<String>) -> String {
    let mut base = base_url.into();
    while base.ends_with('/') {
        base.pop();
    }
    base
}
