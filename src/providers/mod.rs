//! Provider adapters and the machinery that orders and wraps them.
//!
//! The core only depends on [`ProviderAdapter`]. Concrete HTTP adapters are
//! feature-gated, one per external API.

pub mod registry;
pub mod retry;
pub mod routing;
pub mod traits;

#[cfg(any(
    feature = "openai",
    feature = "anthropic",
    feature = "gemini",
    feature = "kie",
    feature = "replicate"
))]
pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "kie")]
pub mod kie;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "replicate")]
pub mod replicate;

pub use registry::{ProviderRegistry, RegisteredProvider};
pub use retry::{RetryConfig, RetryingAdapter};
pub use routing::{ProviderLatency, RoutingConfig};
pub use traits::ProviderAdapter;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicAdapter;
#[cfg(feature = "gemini")]
pub use gemini::GeminiAdapter;
#[cfg(feature = "kie")]
pub use kie::KieAdapter;
#[cfg(feature = "openai")]
pub use openai::OpenAiAdapter;
#[cfg(feature = "replicate")]
pub use replicate::ReplicateAdapter;
