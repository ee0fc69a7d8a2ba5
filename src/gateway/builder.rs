//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{DEFAULT_CALL_TIMEOUT, Gateway, Orchestrator};
use crate::cache::{CacheConfig, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ProviderConfig, ProviderKind, Secrets};
use crate::jobs::{JobConfig, JobTracker};
use crate::providers::{ProviderAdapter, ProviderRegistry, RetryConfig, RoutingConfig};
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::store::{KeyValueStore, MemoryStore};
use crate::types::{Capability, ProviderDescriptor};
use crate::{HuginnError, Result};

/// Main entry point for creating gateway instances.
pub struct Huginn;

impl Huginn {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }
}

/// Builder for configuring gateway instances.
pub struct HuginnBuilder {
    providers: Vec<(ProviderDescriptor, Arc<dyn ProviderAdapter>)>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    rate_limit: RateLimitConfig,
    cache: CacheConfig,
    retry: Option<RetryConfig>,
    routing: RoutingConfig,
    call_timeout: Duration,
    jobs: JobConfig,
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            store: None,
            clock: None,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            retry: None,
            routing: RoutingConfig::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            jobs: JobConfig::default(),
        }
    }

    /// Builder pre-filled from a loaded [`Config`], with API keys resolved
    /// through `secrets`.
    ///
    /// A provider without a key is still registered but reports itself
    /// unconfigured, so routing skips it.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::new()
            .rate_limit((&config.rate_limit).into())
            .cache((&config.cache).into())
            .jobs((&config.jobs).into())
            .routing(config.routing.clone())
            .call_timeout(config.call_timeout());
        if let Some(retry) = config.retry.retry_config() {
            builder = builder.retry(retry);
        }
        for entry in &config.providers {
            let key = secrets.api_key(&entry.name, entry.kind);
            if key.is_none() && entry.enabled {
                warn!(
                    provider = %entry.name,
                    kind = %entry.kind,
                    "no API key found, provider stays unconfigured"
                );
            }
            let adapter = build_adapter(entry, key.unwrap_or_default())?;
            builder = builder.provider(entry.descriptor(), adapter);
        }
        Ok(builder)
    }

    /// Register a provider. Registration order breaks priority ties.
    pub fn provider(
        mut self,
        descriptor: ProviderDescriptor,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.providers.push((descriptor, adapter));
        self
    }

    /// Shared store for cache entries and rate-limit counters.
    ///
    /// Defaults to an in-memory [`MemoryStore`] sized by the cache config.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Clock for job timestamps and the default store's windows.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Retry transient failures inside each provider before falling back.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Budget for one adapter call (default: 120s).
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn jobs(mut self, config: JobConfig) -> Self {
        self.jobs = config;
        self
    }

    /// Build the gateway.
    ///
    /// An empty registry is allowed: every request then fails with
    /// `NoProviderConfigured`.
    pub fn build(self) -> Result<Gateway> {
        if self.rate_limit.enabled && self.rate_limit.window.is_zero() {
            return Err(HuginnError::Configuration(
                "rate limit window must be positive".into(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(HuginnError::Configuration(
                "call timeout must be positive".into(),
            ));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self.store.unwrap_or_else(|| {
            Arc::new(MemoryStore::with_clock(self.cache.max_entries, clock.clone()))
        });

        let mut registry = ProviderRegistry::new();
        if let Some(retry) = self.retry {
            registry.set_retry_config(retry);
        }
        registry.set_routing(self.routing);
        for (descriptor, adapter) in self.providers {
            registry.register(descriptor, adapter);
        }

        if registry.is_empty() {
            warn!("gateway built without providers");
        }
        for capability in Capability::ALL {
            if let Some(preferred) = registry.routing().preferred(capability)
                && registry.get(preferred).is_none()
            {
                warn!(
                    %capability,
                    provider = preferred,
                    "routing prefers a provider that is not registered"
                );
            }
        }
        info!(
            providers = registry.len(),
            text = registry.has(Capability::Text),
            image = registry.has(Capability::Image),
            video = registry.has(Capability::Video),
            "gateway built"
        );

        let registry = Arc::new(registry);
        let orchestrator = Orchestrator::new(
            registry.clone(),
            ResponseCache::new(store.clone(), self.cache),
            RateLimiter::new(store, self.rate_limit),
        )
        .with_call_timeout(self.call_timeout);
        let tracker = JobTracker::new(registry)
            .with_clock(clock)
            .with_status_timeout(self.jobs.status_timeout);

        Ok(Gateway::new(orchestrator, Arc::new(tracker), self.jobs))
    }
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct the adapter for one configured provider.
fn build_adapter(
    entry: &ProviderConfig,
    api_key: String,
) -> Result<Arc<dyn ProviderAdapter>> {
    #[cfg(any(
        feature = "openai",
        feature = "anthropic",
        feature = "gemini",
        feature = "kie",
        feature = "replicate"
    ))]
    let client = crate::providers::http::client_with_timeout(
        entry
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::providers::http::DEFAULT_HTTP_TIMEOUT),
    )?;

    match entry.kind {
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => {
            use crate::providers::OpenAiAdapter;
            let mut adapter = match &entry.base_url {
                Some(url) => OpenAiAdapter::with_base_url(api_key, url),
                None => OpenAiAdapter::new(api_key),
            };
            if let Some(model) = &entry.model {
                adapter = adapter.with_model(model);
            }
            Ok(Arc::new(adapter.with_client(client)))
        }
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => {
            use crate::providers::AnthropicAdapter;
            let mut adapter = match &entry.base_url {
                Some(url) => AnthropicAdapter::with_base_url(api_key, url),
                None => AnthropicAdapter::new(api_key),
            };
            if let Some(model) = &entry.model {
                adapter = adapter.with_model(model);
            }
            Ok(Arc::new(adapter.with_client(client)))
        }
        #[cfg(feature = "gemini")]
        ProviderKind::Gemini => {
            use crate::providers::GeminiAdapter;
            let mut adapter = match &entry.base_url {
                Some(url) => GeminiAdapter::with_base_url(api_key, url),
                None => GeminiAdapter::new(api_key),
            };
            if let Some(model) = &entry.model {
                adapter = adapter.with_model(model);
            }
            Ok(Arc::new(adapter.with_client(client)))
        }
        #[cfg(feature = "kie")]
        ProviderKind::Kie => {
            use crate::providers::KieAdapter;
            let mut adapter = match &entry.base_url {
                Some(url) => KieAdapter::with_base_url(api_key, url),
                None => KieAdapter::new(api_key),
            };
            if let Some(model) = &entry.model {
                adapter = adapter.with_model(model);
            }
            Ok(Arc::new(adapter.with_client(client)))
        }
        #[cfg(feature = "replicate")]
        ProviderKind::Replicate => {
            use crate::providers::ReplicateAdapter;
            let mut adapter = match &entry.base_url {
                Some(url) => ReplicateAdapter::with_base_url(api_key, url),
                None => ReplicateAdapter::new(api_key),
            };
            if let Some(model) = &entry.model {
                adapter = adapter.with_image_model(model);
            }
            if let Some(model) = &entry.video_model {
                adapter = adapter.with_video_model(model);
            }
            Ok(Arc::new(adapter.with_client(client)))
        }
        #[allow(unreachable_patterns)]
        kind => {
            let _ = api_key;
            Err(HuginnError::Configuration(format!(
                "provider {:?}: {kind} support is not compiled in (enable the `{kind}` feature)",
                entry.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_window_is_rejected() {
        let result = Huginn::builder()
            .rate_limit(RateLimitConfig::new().window(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(HuginnError::Configuration(_))));
    }

    #[test]
    fn empty_builder_builds() {
        let gateway = Huginn::builder().build().unwrap();
        assert!(gateway.registry().is_empty());
    }

    #[cfg(all(feature = "kie", feature = "openai"))]
    #[test]
    fn from_config_registers_providers() {
        let config = Config::from_toml_str(
            r#"
            [[providers]]
            name = "kie"
            kind = "kie"
            priority = 1

            [[providers]]
            name = "writer"
            kind = "openai"
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        let secrets: Secrets = toml::from_str(
            r#"
            [kie]
            api_key = "k"
            [writer]
            api_key = "w"
            "#,
        )
        .unwrap();
        let gateway = HuginnBuilder::from_config(&config, &secrets)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(gateway.registry().provider_names(Capability::Video), ["kie"]);
        assert_eq!(gateway.registry().provider_names(Capability::Text), ["writer"]);
    }
}
