//! Caching for expensive operations: built prompts and whole query results.
//!
//! A small key-value trait with TTL semantics backs both the prompt cache
//! and the semantic query cache. Cache failures are never fatal to a query.

mod error;
mod in_memory;
mod semantic;

pub use error::CacheError;
pub use in_memory::InMemoryCache;
pub use semantic::{query_fingerprint, CachedQueryResult, SemanticCache};

use std::time::Duration;

use async_trait::async_trait;

/// Key-value cache with optional per-entry TTL.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Clone + Send + Sync,
{
    /// Returns `None` when the key is missing or expired.
    async fn get(&self, key: &K) -> Option<V>;

    /// Stores a value; `None` TTL means no expiry.
    async fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Removes one entry.
    async fn delete(&self, key: &K) -> Result<(), CacheError>;

    /// Drops every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_trait_object_roundtrip() {
        let cache: Box<dyn Cache<String, String>> = Box::new(InMemoryCache::new());
        cache
            .set("k".to_string(), "v".to_string(), None)
            .await
            .unwrap();
        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
    }
}
