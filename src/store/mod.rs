//! Shared key-value store boundary.
//!
//! The response cache and the rate limiter are the only shared mutable state
//! in huginn, and both go through [`KeyValueStore`]. [`MemoryStore`] is the
//! in-process implementation; a distributed backend (redis, memcached)
//! implements the same trait so several gateway instances share windows and
//! cached generations.

mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryStore;

use crate::Result;

/// Result of [`KeyValueStore::increment_with_ceiling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the increment was applied (count was below the ceiling).
    pub accepted: bool,
    /// Count in the current window after the call.
    pub count: u64,
    /// Time until the current window rolls over.
    pub resets_in: Duration,
}

/// Count read by [`KeyValueStore::window_count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub resets_in: Duration,
}

/// Key-value storage with TTLs and windowed counters.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Expired values read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that expires after `ttl`. Overwrites (last write wins).
    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove a value or counter.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every value and counter whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Atomically increment the counter for `key` in the current fixed
    /// window, unless it already reached `ceiling`.
    ///
    /// Windows are aligned to wall-clock multiples of `window`. Concurrent
    /// callers never push a window past `ceiling`.
    async fn increment_with_ceiling(
        &self,
        key: &str,
        ceiling: u64,
        window: Duration,
    ) -> Result<Admission>;

    /// Read the counter for `key` in the current window without changing it.
    async fn window_count(&self, key: &str, window: Duration) -> Result<WindowCount>;
}
