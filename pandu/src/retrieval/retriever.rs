//! Hybrid retriever: single-collection search or federated fan-out over
//! every registered collection, merged by score and deduplicated by text
//! fingerprint.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::{text_fingerprint, CollectionManager, RetrievalError};

/// Parallelism of the federated fan-out (each branch still holds a read
/// permit on its collection).
const FEDERATED_CONCURRENCY: usize = 4;

/// Per-collection result limit during federated search; the merged set is
/// trimmed to the caller's limit afterwards.
const FEDERATED_PER_COLLECTION: usize = 5;

/// One chunk in a search outcome, tagged with its originating collection.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub collection: String,
    pub doc_id: String,
    pub title: Option<String>,
    pub text: String,
    pub score: f32,
}

/// Result of one logical search.
#[derive(Clone, Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<ScoredChunk>,
}

/// Optional second-stage reranker over merged results.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk>;
}

pub struct HybridRetriever {
    manager: Arc<CollectionManager>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl HybridRetriever {
    pub fn new(manager: Arc<CollectionManager>) -> Self {
        Self {
            manager,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn manager(&self) -> &Arc<CollectionManager> {
        &self.manager
    }

    /// Searches one collection, or federates over all of them when
    /// `collection` is `None`. `_user_level` is reserved for per-tenant
    /// visibility filtering at the store layer.
    pub async fn search(
        &self,
        query: &str,
        _user_level: u8,
        limit: usize,
        collection: Option<&str>,
    ) -> Result<SearchOutcome, RetrievalError> {
        let mut merged = match collection {
            Some(name) => {
                debug!(collection = %name, "single-collection search");
                let chunks = self.manager.search_with_lock(name, query, limit).await?;
                chunks
                    .into_iter()
                    .map(|c| ScoredChunk {
                        collection: name.to_string(),
                        doc_id: c.doc_id,
                        title: c.title,
                        text: c.text,
                        score: c.score,
                    })
                    .collect::<Vec<_>>()
            }
            None => self.federated(query).await,
        };

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        // Dedup by the first 100 chars of text, keeping the best-scored copy.
        let mut seen: HashSet<String> = HashSet::new();
        merged.retain(|c| seen.insert(text_fingerprint(&c.text)));
        merged.truncate(limit);

        if let Some(reranker) = &self.reranker {
            merged = reranker.rerank(query, merged).await;
        }

        Ok(SearchOutcome { results: merged })
    }

    /// Fans out over every primary collection with bounded concurrency. A
    /// failing collection is logged and skipped, never fatal.
    async fn federated(&self, query: &str) -> Vec<ScoredChunk> {
        let names = self.manager.primary_collections();
        debug!(collections = names.len(), "federated search");
        stream::iter(names)
            .map(|name| async move {
                match self
                    .manager
                    .search_with_lock(&name, query, FEDERATED_PER_COLLECTION)
                    .await
                {
                    Ok(chunks) => chunks
                        .into_iter()
                        .map(|c| ScoredChunk {
                            collection: name.clone(),
                            doc_id: c.doc_id,
                            title: c.title,
                            text: c.text,
                            score: c.score,
                        })
                        .collect::<Vec<_>>(),
                    Err(e) => {
                        warn!(collection = %name, error = %e, "federated branch failed");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(FEDERATED_CONCURRENCY)
            .collect::<Vec<Vec<ScoredChunk>>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
