//! Huginn - provider orchestration for generative content APIs
//!
//! Huginn puts several external text, image and video providers behind one
//! [`GenerationGateway`]. Each request is rate limited per caller, answered
//! from a response cache when possible, and otherwise tried against the
//! providers for its capability in priority order until one succeeds.
//! Providers that render asynchronously hand back a job that huginn polls to
//! completion.
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{Capability, GenerationGateway, GenerationRequest, Huginn, ProviderDescriptor};
//! use huginn::providers::{GeminiAdapter, KieAdapter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let gateway = Huginn::builder()
//!         .provider(
//!             ProviderDescriptor::new("gemini", [Capability::Text]).priority(1),
//!             Arc::new(GeminiAdapter::new("gemini-key")),
//!         )
//!         .provider(
//!             ProviderDescriptor::new("kie", [Capability::Video]).priority(1),
//!             Arc::new(KieAdapter::new("kie-key")),
//!         )
//!         .build()?;
//!
//!     let generation = gateway
//!         .generate(&GenerationRequest::text("Three hooks for a bakery reel").caller("user-42"))
//!         .await?;
//!     if let Some(text) = generation.content().and_then(|c| c.as_text()) {
//!         println!("{} said: {text}", generation.provider);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`Config`] and [`Secrets`] load the same setup from TOML; see
//! [`HuginnBuilder::from_config`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod providers;
pub mod ratelimit;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheConfig, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ProviderConfig, ProviderKind, Secrets};
pub use error::{HuginnError, Result};
pub use gateway::{DEFAULT_CALL_TIMEOUT, Gateway, Huginn, HuginnBuilder, Orchestrator};
pub use jobs::{JobConfig, JobPoller, JobTracker, PollerHandle};
pub use providers::{ProviderAdapter, ProviderRegistry, RetryConfig, RoutingConfig};
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use store::{KeyValueStore, MemoryStore};
pub use traits::GenerationGateway;

// Re-export all types
pub use types::{
    AsyncHandle, AsyncJob, Capability, Content, CostModel, FailureKind, GLOBAL_CALLER,
    GatewayStats, GenerateResponse, Generation, GenerationRequest, GenerationStatus, JobId,
    JobState, JobStatus, LatencySnapshot, Outcome, Payload, PollVerdict, ProviderDescriptor,
    ProviderFailure, ProviderResult,
};
