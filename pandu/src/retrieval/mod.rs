//! Retrieval layer: collection registry with per-collection locking, and the
//! hybrid dense+sparse retriever with federated multi-collection search.
//!
//! The vector database itself is external; it appears here as the
//! [`VectorStore`] trait with an in-memory implementation for single-node
//! and test use.

mod collections;
mod embedder;
mod index;
mod retriever;

pub use collections::{default_collections, CollectionDefinition, CollectionManager, Priority};
pub use embedder::{Embedder, HashEmbedder};
pub use index::InMemoryVectorIndex;
pub use retriever::{HybridRetriever, Reranker, ScoredChunk, SearchOutcome};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("ingestion lock timeout for {collection} (timeout: {timeout_s}s)")]
    IngestLockTimeout { collection: String, timeout_s: u64 },
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("store error: {0}")]
    Store(String),
}

/// One document going into a collection.
#[derive(Clone, Debug)]
pub struct Document {
    pub doc_id: String,
    pub title: Option<String>,
    pub text: String,
}

/// One chunk coming back from a collection search.
#[derive(Clone, Debug)]
pub struct RetrievedChunk {
    pub doc_id: String,
    pub title: Option<String>,
    pub text: String,
    pub score: f32,
}

/// A single collection's search/ingest surface.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>, RetrievalError>;

    /// Upserts documents; returns the number written.
    async fn upsert(&self, documents: Vec<Document>) -> Result<usize, RetrievalError>;
}

/// Stable fingerprint used to deduplicate chunks across collections: the
/// first 100 characters of the retrieved text.
pub(crate) fn text_fingerprint(text: &str) -> String {
    text.chars().take(100).collect()
}
