//! Tests for provider ordering and routing preferences.

use std::sync::Arc;

use async_trait::async_trait;
use huginn::{
    Capability, Content, GenerationGateway, GenerationRequest, Huginn, Outcome, ProviderAdapter,
    ProviderDescriptor, ProviderRegistry, RateLimitConfig, RoutingConfig,
};

struct Named(&'static str);

#[async_trait]
impl ProviderAdapter for Named {
    fn name(&self) -> &str {
        self.0
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Outcome {
        Outcome::Success(Content::text(self.0))
    }
}

fn register(
    registry: &mut ProviderRegistry,
    name: &'static str,
    caps: &[Capability],
    priority: u32,
) {
    registry.register(
        ProviderDescriptor::new(name, caps.iter().copied()).priority(priority),
        Arc::new(Named(name)),
    );
}

fn names(chain: Vec<&huginn::providers::RegisteredProvider>) -> Vec<&str> {
    chain.into_iter().map(|p| p.name()).collect()
}

#[test]
fn chain_is_sorted_by_priority_per_capability() {
    let mut registry = ProviderRegistry::new();
    register(&mut registry, "replicate", &[Capability::Image, Capability::Video], 2);
    register(&mut registry, "kie", &[Capability::Video], 1);
    register(&mut registry, "gemini", &[Capability::Text], 1);
    register(&mut registry, "openai", &[Capability::Text, Capability::Image], 2);

    assert_eq!(names(registry.providers_for(Capability::Text)), ["gemini", "openai"]);
    assert_eq!(names(registry.providers_for(Capability::Image)), ["openai", "replicate"]);
    assert_eq!(names(registry.providers_for(Capability::Video)), ["kie", "replicate"]);
}

#[test]
fn preference_promotes_without_duplicating() {
    let mut registry = ProviderRegistry::new();
    register(&mut registry, "a", &[Capability::Text], 1);
    register(&mut registry, "b", &[Capability::Text], 2);
    register(&mut registry, "c", &[Capability::Text], 3);

    let chain = registry.providers_for_preferring(Capability::Text, Some("c"));
    assert_eq!(names(chain), ["c", "a", "b"]);

    let chain = registry.providers_for_preferring(Capability::Text, Some("a"));
    assert_eq!(names(chain), ["a", "b", "c"]);

    let chain = registry.providers_for_preferring(Capability::Text, Some("missing"));
    assert_eq!(names(chain), ["a", "b", "c"]);
}

#[test]
fn request_preference_beats_routing_config() {
    let mut registry = ProviderRegistry::new();
    registry.set_routing(RoutingConfig::new().text("b"));
    register(&mut registry, "a", &[Capability::Text], 1);
    register(&mut registry, "b", &[Capability::Text], 2);
    register(&mut registry, "c", &[Capability::Text], 3);

    let routed = registry.providers_for_preferring(Capability::Text, None);
    assert_eq!(names(routed), ["b", "a", "c"]);

    let requested = registry.providers_for_preferring(Capability::Text, Some("c"));
    assert_eq!(names(requested), ["c", "a", "b"]);
}

#[test]
fn registering_a_name_twice_replaces_it() {
    let mut registry = ProviderRegistry::new();
    register(&mut registry, "kie", &[Capability::Video], 5);
    register(&mut registry, "kie", &[Capability::Video], 1);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("kie").map(|p| p.descriptor.priority), Some(1));
}

#[test]
fn has_reflects_configured_providers() {
    let mut registry = ProviderRegistry::new();
    assert!(registry.is_empty());
    assert!(!registry.has(Capability::Video));

    registry.register(
        ProviderDescriptor::new("kie", [Capability::Video]).enabled(false),
        Arc::new(Named("kie")),
    );
    assert!(!registry.has(Capability::Video));
    assert!(registry.get("kie").is_some());

    register(&mut registry, "replicate", &[Capability::Video], 1);
    assert!(registry.has(Capability::Video));
    assert_eq!(
        registry.descriptors().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        ["kie", "replicate"]
    );
}

#[tokio::test]
async fn latency_is_recorded_after_a_call() {
    let gateway = Huginn::builder()
        .rate_limit(RateLimitConfig::disabled())
        .provider(
            ProviderDescriptor::new("gemini", [Capability::Text]),
            Arc::new(Named("gemini")),
        )
        .build()
        .unwrap();
    assert_eq!(gateway.registry().latency("gemini"), None);

    gateway
        .generate(&GenerationRequest::text("x"))
        .await
        .unwrap();
    let latency = gateway.registry().latency("gemini").unwrap();
    assert_eq!(latency.samples, 1);
    assert!(latency.max_ms >= latency.last_ms);
}
