//! Caching subsystem.
//!
//! [`ResponseCache`] memoizes successful generations keyed by normalized
//! request content. It stores entries through the shared
//! [`KeyValueStore`](crate::store::KeyValueStore), so a distributed store
//! gives every gateway instance the same cache.

pub mod response;

pub use response::{CACHE_KEY_PREFIX, CacheConfig, ResponseCache, cache_key};
