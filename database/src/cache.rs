//! # TTL Cache
//!
//! Bounded in-process key/value cache with per-entry expiry. When the cache
//! is full, inserting a new key evicts the oldest-inserted surviving key
//! (FIFO, not LRU). Overwriting a key refreshes its value and expiry but
//! keeps its insertion position. Expired entries are dropped lazily on `get`
//! or eagerly through `purge_expired`.
//!
//! Time is read from `tokio::time::Instant`, so paused-clock tests can
//! advance it deterministically.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::config::CacheConfig;

/// A cached value and the instant it stops being served
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys in insertion order
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> CacheState<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

/// TTL cache manager
pub struct TtlCache<V> {
    state: Mutex<CacheState<V>>,
    config: CacheConfig,
}

impl<V: Clone> TtlCache<V> {
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(config.max_size),
                order: VecDeque::with_capacity(config.max_size),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            config,
        }
    }

    /// Store `value` under `key`; `ttl` falls back to the configured default
    #[instrument(skip(self, value), fields(key = %key))]
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let expires_at = Instant::now() + ttl;
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            debug!("Refreshed cache key {} with TTL: {:?}", key, ttl);
            return;
        }

        while state.entries.len() >= self.config.max_size.max(1) {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
            debug!("Evicted oldest cache key: {}", oldest);
        }

        state
            .entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        state.order.push_back(key.to_string());
        debug!("Set cache key {} with TTL: {:?}", key, ttl);
    }

    /// Store `value` with the default TTL
    pub fn set_with_default_ttl(&self, key: &str, value: V) {
        self.set(key, value, None)
    }

    /// Returns the value if present and not yet expired; counts a hit or miss
    #[instrument(skip(self), fields(key = %key))]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let live = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                state.remove(key);
                debug!("Cache entry expired: {}", key);
                None
            }
            None => None,
        };

        match live {
            Some(value) => {
                state.hits += 1;
                debug!("Cache hit for key: {}", key);
                Some(value)
            }
            None => {
                state.misses += 1;
                debug!("Cache miss for key: {}", key);
                None
            }
        }
    }

    /// Remove a single key
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every entry, or only those whose key contains `pattern`.
    /// Returns the number of removed entries.
    #[instrument(skip(self))]
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let mut state = self.state.lock();
        let removed = match pattern {
            Some(pattern) => {
                let before = state.entries.len();
                state.entries.retain(|key, _| !key.contains(pattern));
                state.order.retain(|key| !key.contains(pattern));
                before - state.entries.len()
            }
            None => {
                let count = state.entries.len();
                state.entries.clear();
                state.order.clear();
                count
            }
        };
        debug!("Cleared {} cache entries", removed);
        removed
    }

    /// Eagerly drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let CacheState { entries, order, .. } = &mut *state;
        order.retain(|key| entries.contains_key(key));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().order.iter().cloned().collect()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            max_size: self.config.max_size,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    /// Get cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hits as a percentage of all lookups, 0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache Stats: size={}/{}, hits={}, misses={}, evictions={}, hit_rate={:.1}%",
            self.size,
            self.max_size,
            self.hits,
            self.misses,
            self.evictions,
            self.hit_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cache(max_size: usize) -> TtlCache<u32> {
        TtlCache::new(CacheConfig {
            max_size,
            default_ttl_secs: 300,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_at_ttl() {
        let cache = cache(10);
        cache.set("quote:AAPL", 175, Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert_eq!(cache.get("quote:AAPL"), Some(175));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("quote:AAPL"), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let cache = cache(10);
        cache.set_with_default_ttl("k", 1);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k"), Some(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = cache(3);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        // reading does not protect "a" from eviction
        assert_eq!(cache.get("a"), Some(1));

        cache.set("d", 4, None);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.keys(), vec!["b", "c", "d"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_keeps_insertion_position() {
        let cache = cache(3);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);
        cache.set("a", 10, None);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 0);

        cache.set("d", 4, None);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_clear_with_pattern() {
        let cache = cache(10);
        cache.set("portfolio:1", 1, None);
        cache.set("portfolio:2", 2, None);
        cache.set("securities", 3, None);

        assert_eq!(cache.clear(Some("portfolio")), 2);
        assert_eq!(cache.keys(), vec!["securities"]);
        assert_eq!(cache.clear(None), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache(10);
        cache.set("short", 1, Some(Duration::from_secs(1)));
        cache.set("long", 2, Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.keys(), vec!["long"]);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            size: 5,
            max_size: 100,
            hits: 3,
            misses: 1,
            evictions: 0,
        };
        let display = format!("{}", stats);
        assert!(display.contains("size=5/100"));
        assert!(display.contains("hit_rate=75.0%"));
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_max(
            max_size in 1usize..16,
            keys in proptest::collection::vec(0u8..32, 0..200),
        ) {
            let cache = cache(max_size);
            for key in keys {
                cache.set(&format!("k{}", key), key as u32, None);
                prop_assert!(cache.len() <= max_size);
            }
        }
    }
}
