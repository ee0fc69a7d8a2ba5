//! Provider registry with priority-ordered fallback chains.
//!
//! The `ProviderRegistry` holds every adapter with its
//! [`ProviderDescriptor`]. For a capability it yields the providers that
//! serve it, ordered by priority rank (registration order breaks ties) and
//! filtered to those that are configured.
//!
//! # Retry Wrapping
//!
//! When a `RetryConfig` is set, adapters are wrapped in [`RetryingAdapter`]
//! at registration time. Each provider retries transient failures
//! internally; the orchestrator only sees the failure once retries are
//! spent, then moves on to the next provider.
//!
//! # Fallback Chain
//!
//! ```text
//! orchestrator.generate(video request)
//!                     │
//!                     ▼
//!         ┌─────────────────────┐
//!         │  ProviderRegistry   │  providers_for_preferring(video, "kie")
//!         └─────────┬───────────┘
//!                   │ try in order
//!                   ▼
//!         ┌─────────────────────┐
//!         │  kie (preferred)    │ ──► QuotaExceeded
//!         └─────────┬───────────┘
//!                   │ next
//!                   ▼
//!         ┌─────────────────────┐
//!         │  replicate (prio 20)│ ──► Pending(prediction id)
//!         └─────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::retry::{RetryConfig, RetryingAdapter};
use super::routing::{HasName, ProviderLatency, RoutingConfig, promote_preferred};
use super::traits::ProviderAdapter;
use crate::telemetry;
use crate::types::{Capability, LatencySnapshot, ProviderDescriptor};

/// One adapter with its static metadata and live latency.
pub struct RegisteredProvider {
    pub descriptor: ProviderDescriptor,
    pub adapter: Arc<dyn ProviderAdapter>,
    pub latency: Arc<ProviderLatency>,
}

impl RegisteredProvider {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Enabled in configuration and holding credentials.
    pub fn is_configured(&self) -> bool {
        self.descriptor.enabled && self.adapter.is_configured()
    }
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("descriptor", &self.descriptor)
            .field("configured", &self.is_configured())
            .field("latency", &self.latency)
            .finish()
    }
}

impl HasName for &RegisteredProvider {
    fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Registry of providers across all capabilities.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    retry_config: Option<RetryConfig>,
    routing: RoutingConfig,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry configuration.
    ///
    /// Adapters registered after this call are wrapped in [`RetryingAdapter`].
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = Some(config);
    }

    /// Set per-capability routing preferences.
    pub fn set_routing(&mut self, routing: RoutingConfig) {
        self.routing = routing;
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Register an adapter under its descriptor.
    ///
    /// The descriptor's name is the provider's identity; registering the
    /// same name twice replaces the earlier entry in place.
    pub fn register(&mut self, descriptor: ProviderDescriptor, adapter: Arc<dyn ProviderAdapter>) {
        if adapter.name() != descriptor.name {
            debug!(
                descriptor = %descriptor.name,
                adapter = adapter.name(),
                "adapter registered under a custom name"
            );
        }
        let entry = RegisteredProvider {
            adapter: self.maybe_wrap(adapter),
            latency: Arc::new(ProviderLatency::new()),
            descriptor,
        };
        match self
            .providers
            .iter_mut()
            .find(|p| p.descriptor.name == entry.descriptor.name)
        {
            Some(existing) => {
                warn!(provider = %entry.descriptor.name, "replacing registered provider");
                *existing = entry;
            }
            None => self.providers.push(entry),
        }
    }

    /// Configured providers for a capability, in trial order.
    ///
    /// Empty (never an error) when nothing is configured.
    pub fn providers_for(&self, capability: Capability) -> Vec<&RegisteredProvider> {
        let mut chain: Vec<&RegisteredProvider> = self
            .providers
            .iter()
            .filter(|p| p.descriptor.supports(capability) && p.is_configured())
            .collect();
        // Stable: equal priorities keep registration order.
        chain.sort_by_key(|p| p.descriptor.priority);
        chain
    }

    /// Like [`providers_for`](Self::providers_for), with a preferred provider
    /// moved to the front.
    ///
    /// `preferred` falls back to the routing config for the capability. A
    /// preference naming an unconfigured provider is ignored.
    pub fn providers_for_preferring(
        &self,
        capability: Capability,
        preferred: Option<&str>,
    ) -> Vec<&RegisteredProvider> {
        let mut chain = self.providers_for(capability);
        if let Some(name) = preferred.or_else(|| self.routing.preferred(capability)) {
            promote_preferred(&mut chain, name);
        }
        chain
    }

    /// Look up a provider by name, configured or not.
    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.descriptor.name == name)
    }

    /// Names of configured providers for a capability, in trial order.
    pub fn provider_names(&self, capability: Capability) -> Vec<String> {
        self.providers_for_preferring(capability, None)
            .into_iter()
            .map(|p| p.descriptor.name.clone())
            .collect()
    }

    /// Whether any configured provider serves the capability.
    pub fn has(&self, capability: Capability) -> bool {
        self.providers
            .iter()
            .any(|p| p.descriptor.supports(capability) && p.is_configured())
    }

    /// Descriptors of every registered provider, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter().map(|p| &p.descriptor)
    }

    /// Latency figures for a provider, once it has served a request.
    pub fn latency(&self, name: &str) -> Option<LatencySnapshot> {
        self.get(name).and_then(|p| p.latency.snapshot())
    }

    /// Latency figures of every provider that has been called.
    pub fn latencies(&self) -> BTreeMap<String, LatencySnapshot> {
        self.providers
            .iter()
            .filter_map(|p| Some((p.descriptor.name.clone(), p.latency.snapshot()?)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Record invocation metrics (counter + histogram).
    pub(crate) fn record_request(
        provider: &str,
        capability: Capability,
        status: &'static str,
        start: Instant,
    ) {
        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "capability" => capability.as_str(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.to_owned(),
            "capability" => capability.as_str(),
        )
        .record(elapsed);
    }

    fn maybe_wrap(&self, adapter: Arc<dyn ProviderAdapter>) -> Arc<dyn ProviderAdapter> {
        match &self.retry_config {
            Some(config) if config.max_attempts > 1 => {
                Arc::new(RetryingAdapter::new(adapter, config.clone()))
            }
            _ => adapter,
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers)
            .field("retry_config", &self.retry_config)
            .field("routing", &self.routing)
            .finish()
    }
}
