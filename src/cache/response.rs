//! Idempotency cache for successful generations.
//!
//! [`ResponseCache`] sits in the orchestrator between the rate limiter and
//! the fallback chain. A hit skips provider selection entirely and is
//! returned with `cached = true`.
//!
//! # Keys
//!
//! `huginn:cache:{capability}:{sha256}` where the digest covers the
//! capability, prompt and options serialized as canonical JSON. Options are
//! a sorted map, so the order in which a caller set options never changes
//! the key.
//!
//! # Store failures
//!
//! The cache fails open: a store error on read is a miss and a store error
//! on write is logged and dropped. Generation still proceeds.
//!
//! No stampede protection: concurrent misses on the same key both call a
//! provider and both write; the last write wins.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::store::KeyValueStore;
use crate::telemetry;
use crate::types::{Capability, Content, GenerationRequest, Outcome, Payload, ProviderResult};

/// Key prefix shared by every cached generation.
pub const CACHE_KEY_PREFIX: &str = "huginn:cache:";

/// Configuration for the response cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether cacheable requests consult the cache at all. Default: true.
    pub enabled: bool,
    /// Capacity of the in-memory store, when huginn creates one. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with caching switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// What a cache entry holds. Only successful content can be represented.
#[derive(Debug, Serialize, Deserialize)]
struct CachedGeneration {
    provider: String,
    content: Content,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    capability: Capability,
    prompt: &'a str,
    options: &'a std::collections::BTreeMap<String, serde_json::Value>,
}

/// Compute the cache key for a capability and payload.
pub fn cache_key(capability: Capability, payload: &Payload) -> String {
    let material = KeyMaterial {
        capability,
        prompt: &payload.prompt,
        options: &payload.options,
    };
    // Serializing a struct of strings and JSON values cannot fail.
    let canonical = serde_json::to_vec(&material).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    format!("{CACHE_KEY_PREFIX}{capability}:{}", hex::encode(digest))
}

/// Cache of successful generations over a [`KeyValueStore`].
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Default TTL for new entries.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Look up the cached result for a request. Emits hit/miss metrics.
    pub async fn lookup(&self, request: &GenerationRequest) -> Option<ProviderResult> {
        let key = cache_key(request.capability, &request.payload);
        let capability = request.capability.as_str();
        match self.get(&key).await {
            Some(result) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "capability" => capability)
                    .increment(1);
                debug!(key = %key, provider = %result.provider, "cache hit");
                Some(result)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "capability" => capability)
                    .increment(1);
                None
            }
        }
    }

    /// Store a request's result with the default TTL.
    ///
    /// Returns whether anything was written; failures and pending results
    /// are never cached.
    pub async fn store(&self, request: &GenerationRequest, result: &ProviderResult) -> bool {
        let key = cache_key(request.capability, &request.payload);
        self.put(&key, result, self.config.ttl).await
    }

    /// Read a cached result by key. Store errors read as a miss.
    pub async fn get(&self, key: &str) -> Option<ProviderResult> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str::<CachedGeneration>(&raw) {
            Ok(cached) => Some(ProviderResult {
                provider: cached.provider,
                outcome: Outcome::Success(cached.content),
                cached: true,
            }),
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Write a result under `key`. Only `Success` outcomes are written.
    pub async fn put(&self, key: &str, result: &ProviderResult, ttl: Duration) -> bool {
        let Outcome::Success(content) = &result.outcome else {
            return false;
        };
        let entry = CachedGeneration {
            provider: result.provider.clone(),
            content: content.clone(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache entry");
                return false;
            }
        };
        match self.store.put_with_ttl(key, raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Remove one entry.
    pub async fn purge(&self, key: &str) -> crate::Result<()> {
        self.store.delete(key).await
    }

    /// Remove every cached generation.
    pub async fn purge_all(&self) -> crate::Result<()> {
        self.store.delete_prefix(CACHE_KEY_PREFIX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_option_order() {
        let a = Payload::new("cat").option("size", "1024").option("style", "photo");
        let b = Payload::new("cat").option("style", "photo").option("size", "1024");
        assert_eq!(cache_key(Capability::Image, &a), cache_key(Capability::Image, &b));
    }

    #[test]
    fn key_differs_on_capability() {
        let payload = Payload::new("a lighthouse");
        assert_ne!(
            cache_key(Capability::Image, &payload),
            cache_key(Capability::Video, &payload)
        );
    }

    #[test]
    fn key_differs_on_prompt_and_options() {
        let base = Payload::new("p");
        assert_ne!(
            cache_key(Capability::Text, &base),
            cache_key(Capability::Text, &Payload::new("q"))
        );
        assert_ne!(
            cache_key(Capability::Text, &base),
            cache_key(Capability::Text, &base.clone().option("tone", "formal"))
        );
    }

    #[test]
    fn key_shape() {
        let key = cache_key(Capability::Video, &Payload::new("p"));
        assert!(key.starts_with("huginn:cache:video:"));
        assert_eq!(key.len(), "huginn:cache:video:".len() + 64);
    }
}
