//! In-memory TTL cache backed by a `DashMap`.
//!
//! Expired entries are dropped lazily on read; `purge_expired` exists for
//! callers that want to bound memory on long-lived processes.

use std::hash::Hash;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Cache, CacheError};

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

/// Process-local cache with per-entry TTL.
pub struct InMemoryCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> InMemoryCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Removes every expired entry.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, e| !e.is_expired());
    }

    /// Live (non-expired) entry count.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
        }
        // Expired: drop it so the map does not grow unbounded.
        self.entries.remove_if(key, |_, e| e.is_expired());
        None
    }

    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(key, Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}
