//! Generation requests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::HuginnError;

/// Rate-limit key used when a request carries no caller identity.
pub const GLOBAL_CALLER: &str = "global";

/// A generation kind a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Image,
    Video,
}

impl Capability {
    /// All capabilities, in display order.
    pub const ALL: [Capability; 3] = [Capability::Text, Capability::Image, Capability::Video];

    /// Lowercase name, as used in config files and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
            Capability::Video => "video",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Capability::Text),
            "image" => Ok(Capability::Image),
            "video" => Ok(Capability::Video),
            other => Err(HuginnError::InvalidInput(format!(
                "unknown capability '{other}' (expected text, image or video)"
            ))),
        }
    }
}

/// Prompt plus free-form provider options.
///
/// Options live in a sorted map, so two payloads built with the same
/// options in a different order are equal and hash to the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub prompt: String,
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Payload {
    /// Create a payload with no options.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: BTreeMap::new(),
        }
    }

    /// Set an option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Look up an option.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    /// Look up a string option.
    pub fn str_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// Requested media duration, read from the `duration` option (seconds).
    ///
    /// Values too large for a [`Duration`] saturate at [`Duration::MAX`], so
    /// they still exceed every provider limit.
    pub fn duration(&self) -> Option<Duration> {
        self.options
            .get("duration")
            .and_then(|v| v.as_f64())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }
}

/// One incoming generation call.
///
/// Built once per call and only read afterwards.
///
/// ```rust
/// # use huginn::{GenerationRequest, Capability};
/// let request = GenerationRequest::video("a fox running through snow")
///     .option("aspect_ratio", "9:16")
///     .caller("user-42")
///     .prefer("kie");
/// assert_eq!(request.capability, Capability::Video);
/// assert!(request.cacheable);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub capability: Capability,
    pub payload: Payload,
    /// Caller identity for rate limiting. `None` shares the global window.
    pub caller: Option<String>,
    /// Whether a successful result may be served from / stored in the cache.
    pub cacheable: bool,
    /// Provider to try first, if it is configured for this capability.
    pub preferred_provider: Option<String>,
}

impl GenerationRequest {
    /// Create a cacheable request with no caller identity.
    pub fn new(capability: Capability, payload: Payload) -> Self {
        Self {
            capability,
            payload,
            caller: None,
            cacheable: true,
            preferred_provider: None,
        }
    }

    /// Text generation request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new(Capability::Text, Payload::new(prompt))
    }

    /// Image generation request.
    pub fn image(prompt: impl Into<String>) -> Self {
        Self::new(Capability::Image, Payload::new(prompt))
    }

    /// Video generation request.
    pub fn video(prompt: impl Into<String>) -> Self {
        Self::new(Capability::Video, Payload::new(prompt))
    }

    /// Set a payload option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload = self.payload.option(key, value);
        self
    }

    /// Set the caller identity.
    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Enable or disable caching for this request.
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Prefer a provider by name.
    pub fn prefer(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    /// The rate-limit key for this request.
    pub fn caller_key(&self) -> &str {
        self.caller.as_deref().unwrap_or(GLOBAL_CALLER)
    }

    /// The prompt text.
    pub fn prompt(&self) -> &str {
        &self.payload.prompt
    }
}
