//! Routing preferences and per-provider latency tracking.
//!
//! - [`RoutingConfig`] names a preferred provider per capability; it moves to
//!   the front of the fallback chain. A request's own `preferred_provider`
//!   overrides it.
//! - [`ProviderLatency`] measures each provider's invocations; the figures
//!   show up per provider in gateway stats.
//!
//! ```rust,ignore
//! Huginn::builder()
//!     .provider(gemini_descriptor, gemini)
//!     .provider(anthropic_descriptor, anthropic)
//!     .routing(RoutingConfig::new().text("anthropic"))
//!     .build()
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Capability, LatencySnapshot};

/// Preferred provider per capability.
///
/// ```toml
/// [routing]
/// text = "gemini"
/// video = "kie"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

impl RoutingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, provider: impl Into<String>) -> Self {
        self.text = Some(provider.into());
        self
    }

    pub fn image(mut self, provider: impl Into<String>) -> Self {
        self.image = Some(provider.into());
        self
    }

    pub fn video(mut self, provider: impl Into<String>) -> Self {
        self.video = Some(provider.into());
        self
    }

    /// The preferred provider for a capability, if any.
    pub fn preferred(&self, capability: Capability) -> Option<&str> {
        match capability {
            Capability::Text => self.text.as_deref(),
            Capability::Image => self.image.as_deref(),
            Capability::Video => self.video.as_deref(),
        }
    }
}

/// Move the named provider to index 0, keeping the others in order.
///
/// No-op when `preferred` is absent from the list. Never duplicates.
pub(crate) fn promote_preferred<T: HasName>(providers: &mut [T], preferred: &str) {
    if let Some(idx) = providers.iter().position(|p| p.name() == preferred)
        && idx > 0
    {
        providers[..=idx].rotate_right(1);
    }
}

/// Anything with a provider name, so [`promote_preferred`] stays generic.
pub(crate) trait HasName {
    fn name(&self) -> &str;
}

/// Weight of the newest sample in the smoothed mean.
const SMOOTHING: f64 = 0.2;

#[derive(Debug, Default)]
struct LatencyWindow {
    samples: u64,
    mean_ms: f64,
    last: Duration,
    max: Duration,
}

/// Invocation latency of one provider, measured around each adapter call.
///
/// The first sample seeds the mean; later ones move it by [`SMOOTHING`].
#[derive(Debug, Default)]
pub struct ProviderLatency {
    window: Mutex<LatencyWindow>,
}

impl ProviderLatency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let sample_ms = elapsed.as_secs_f64() * 1_000.0;
        window.mean_ms = if window.samples == 0 {
            sample_ms
        } else {
            SMOOTHING * sample_ms + (1.0 - SMOOTHING) * window.mean_ms
        };
        window.samples += 1;
        window.last = elapsed;
        window.max = window.max.max(elapsed);
    }

    /// Current figures, or `None` before the provider was ever called.
    pub fn snapshot(&self) -> Option<LatencySnapshot> {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        (window.samples > 0).then(|| LatencySnapshot {
            samples: window.samples,
            mean_ms: window.mean_ms.round() as u64,
            last_ms: window.last.as_millis() as u64,
            max_ms: window.max.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl HasName for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn names(providers: &[Named]) -> Vec<&str> {
        providers.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn routing_config_lookup() {
        let config = RoutingConfig::new().video("kie");
        assert_eq!(config.preferred(Capability::Video), Some("kie"));
        assert_eq!(config.preferred(Capability::Text), None);
    }

    #[test]
    fn routing_config_from_toml() {
        let config: RoutingConfig = toml::from_str(r#"text = "anthropic""#).unwrap();
        assert_eq!(config.text.as_deref(), Some("anthropic"));
        assert!(config.image.is_none());
    }

    #[test]
    fn promote_moves_to_front_preserving_others() {
        let mut providers = [Named("a"), Named("b"), Named("c"), Named("d")];
        promote_preferred(&mut providers, "c");
        assert_eq!(names(&providers), ["c", "a", "b", "d"]);
    }

    #[test]
    fn promote_noop_cases() {
        let mut providers = [Named("a"), Named("b")];
        promote_preferred(&mut providers, "a");
        assert_eq!(names(&providers), ["a", "b"]);
        promote_preferred(&mut providers, "missing");
        assert_eq!(names(&providers), ["a", "b"]);
    }

    #[test]
    fn latency_is_unknown_until_first_call() {
        assert!(ProviderLatency::new().snapshot().is_none());
    }

    #[test]
    fn latency_tracks_mean_last_and_max() {
        let latency = ProviderLatency::new();
        latency.record(Duration::from_millis(100));
        assert_eq!(
            latency.snapshot(),
            Some(LatencySnapshot {
                samples: 1,
                mean_ms: 100,
                last_ms: 100,
                max_ms: 100,
            })
        );

        latency.record(Duration::from_millis(600));
        latency.record(Duration::from_millis(50));
        let snapshot = latency.snapshot().unwrap();
        assert_eq!(snapshot.samples, 3);
        // 100 -> 200 -> 170
        assert_eq!(snapshot.mean_ms, 170);
        assert_eq!(snapshot.last_ms, 50);
        assert_eq!(snapshot.max_ms, 600);
    }
}
