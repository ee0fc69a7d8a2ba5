//! In-process [`KeyValueStore`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;

use super::{Admission, KeyValueStore, WindowCount};
use crate::Result;
use crate::clock::{Clock, SystemClock};

/// Default upper bound on stored values.
const DEFAULT_MAX_VALUES: u64 = 10_000;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

/// Expires each value after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    index: i64,
    count: u64,
}

/// Memory-backed store: moka for TTL values, DashMap for window counters.
///
/// Counter increments run under the DashMap shard lock for their key, so the
/// read-compare-increment is atomic with respect to other callers.
pub struct MemoryStore {
    values: Cache<String, StoredValue>,
    counters: DashMap<String, WindowSlot>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Store with default capacity on the system clock.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_VALUES)
    }

    /// Store holding at most `max_values` values (LRU beyond that).
    pub fn with_capacity(max_values: u64) -> Self {
        Self::with_clock(max_values, Arc::new(SystemClock))
    }

    /// Store whose counter windows follow `clock`.
    ///
    /// Value TTLs always follow real time.
    pub fn with_clock(max_values: u64, clock: Arc<dyn Clock>) -> Self {
        let values = Cache::builder()
            .max_capacity(max_values)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            values,
            counters: DashMap::new(),
            clock,
        }
    }

    /// Current window index and time until it ends.
    fn window_position(&self, window: Duration) -> (i64, Duration) {
        let window_ms = (window.as_millis() as i64).max(1);
        let now = self.clock.now_millis();
        let index = now.div_euclid(window_ms);
        let resets_in = Duration::from_millis((window_ms - now.rem_euclid(window_ms)) as u64);
        (index, resets_in)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("values", &self.values.entry_count())
            .field("counters", &self.counters.len())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).await.map(|stored| stored.value))
    }

    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.values
            .insert(key.to_owned(), StoredValue { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.invalidate(key).await;
        self.counters.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let keys: Vec<Arc<String>> = self
            .values
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.values.invalidate(key.as_str()).await;
        }
        self.counters.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn increment_with_ceiling(
        &self,
        key: &str,
        ceiling: u64,
        window: Duration,
    ) -> Result<Admission> {
        let (index, resets_in) = self.window_position(window);
        let mut slot = self
            .counters
            .entry(key.to_owned())
            .or_insert(WindowSlot { index, count: 0 });
        if slot.index != index {
            *slot = WindowSlot { index, count: 0 };
        }
        let accepted = slot.count < ceiling;
        if accepted {
            slot.count += 1;
        }
        Ok(Admission {
            accepted,
            count: slot.count,
            resets_in,
        })
    }

    async fn window_count(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let (index, resets_in) = self.window_position(window);
        let count = self
            .counters
            .get(key)
            .filter(|slot| slot.index == index)
            .map(|slot| slot.count)
            .unwrap_or(0);
        Ok(WindowCount { count, resets_in })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn store_at(millis: i64) -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_millis(millis));
        (MemoryStore::with_clock(100, clock.clone()), clock)
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryStore::new();
        store
            .put_with_ttl("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_expire_after_their_ttl() {
        let store = MemoryStore::new();
        store
            .put_with_ttl("short", "v".into(), Duration::from_millis(30))
            .await
            .unwrap();
        store
            .put_with_ttl("long", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_prefix_leaves_other_keys() {
        let store = MemoryStore::new();
        for key in ["a:1", "a:2", "b:1"] {
            store
                .put_with_ttl(key, "v".into(), MINUTE)
                .await
                .unwrap();
        }
        store.delete_prefix("a:").await.unwrap();
        assert_eq!(store.get("a:1").await.unwrap(), None);
        assert_eq!(store.get("a:2").await.unwrap(), None);
        assert!(store.get("b:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn increment_stops_at_ceiling() {
        let (store, _clock) = store_at(0);
        for expected in 1..=3 {
            let admission = store.increment_with_ceiling("c", 3, MINUTE).await.unwrap();
            assert!(admission.accepted);
            assert_eq!(admission.count, expected);
        }
        let admission = store.increment_with_ceiling("c", 3, MINUTE).await.unwrap();
        assert!(!admission.accepted);
        assert_eq!(admission.count, 3);
    }

    #[tokio::test]
    async fn window_is_wall_clock_aligned() {
        // 45s into a minute: the window resets 15s later, not 60s later.
        let (store, clock) = store_at(45_000);
        let admission = store.increment_with_ceiling("c", 1, MINUTE).await.unwrap();
        assert_eq!(admission.resets_in, Duration::from_secs(15));

        clock.advance(Duration::from_secs(15));
        let count = store.window_count("c", MINUTE).await.unwrap();
        assert_eq!(count.count, 0);
        assert!(store.increment_with_ceiling("c", 1, MINUTE).await.unwrap().accepted);
    }
}
