//! Semantic query cache: normalized query fingerprint → prior result.
//!
//! The fingerprint is a sha256 over the lowercased, whitespace-collapsed
//! query, so trivially rephrased whitespace/casing variants hit the same
//! entry. Entries are TTL-bounded; lookup errors never fail the query.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Cache, InMemoryCache};
use crate::state::SourceRef;

/// A previously computed answer, replayable on a cache hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedQueryResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Stable fingerprint of a query for cache keying.
pub fn query_fingerprint(query: &str) -> String {
    let normalized = query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{digest:x}")
}

/// TTL-bounded cache of whole query results.
pub struct SemanticCache {
    inner: Arc<InMemoryCache<String, CachedQueryResult>>,
    ttl: Duration,
}

impl SemanticCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(InMemoryCache::new()),
            ttl,
        }
    }

    pub async fn get_cached_result(&self, query: &str) -> Option<CachedQueryResult> {
        self.inner.get(&query_fingerprint(query)).await
    }

    /// Stores a result. Failures are logged and swallowed.
    pub async fn store(&self, query: &str, result: CachedQueryResult) {
        if let Err(e) = self
            .inner
            .set(query_fingerprint(query), result, Some(self.ttl))
            .await
        {
            tracing::warn!(error = %e, "semantic cache store failed");
        }
    }

    pub async fn clear(&self) {
        let _ = self.inner.clear().await;
    }
}
