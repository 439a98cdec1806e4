//! In-memory hybrid index: dense cosine score blended with a sparse
//! term-overlap score. Backs one collection in tests and single-node runs.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Document, Embedder, RetrievalError, RetrievedChunk, VectorStore};

const DENSE_WEIGHT: f32 = 0.7;
const SPARSE_WEIGHT: f32 = 0.3;

struct IndexedDoc {
    doc: Document,
    embedding: Vec<f32>,
}

/// One collection held in memory, keyed by `doc_id` on upsert.
pub struct InMemoryVectorIndex {
    embedder: std::sync::Arc<dyn Embedder>,
    docs: RwLock<Vec<IndexedDoc>>,
}

impl InMemoryVectorIndex {
    pub fn new(embedder: std::sync::Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            docs: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    // Embeddings are normalized, so the dot product is the cosine.
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn term_overlap(query: &str, text: &str) -> f32 {
    let tokens = |s: &str| {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect::<HashSet<_>>()
    };
    let q = tokens(query);
    if q.is_empty() {
        return 0.0;
    }
    let d = tokens(text);
    let hits = q.iter().filter(|t| d.contains(*t)).count();
    hits as f32 / q.len() as f32
}

#[async_trait]
impl VectorStore for InMemoryVectorIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let query_embedding = self.embedder.embed(query).await?;
        let docs = self.docs.read().await;
        let mut scored: Vec<RetrievedChunk> = docs
            .iter()
            .map(|d| {
                let dense = cosine(&query_embedding, &d.embedding);
                let sparse = term_overlap(query, &d.doc.text);
                RetrievedChunk {
                    doc_id: d.doc.doc_id.clone(),
                    title: d.doc.title.clone(),
                    text: d.doc.text.clone(),
                    score: DENSE_WEIGHT * dense + SPARSE_WEIGHT * sparse,
                }
            })
            .collect();
        scored.retain(|c| c.score > 0.0);
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn upsert(&self, documents: Vec<Document>) -> Result<usize, RetrievalError> {
        let mut written = 0;
        let mut docs = self.docs.write().await;
        for doc in documents {
            let embedding = self.embedder.embed(&doc.text).await?;
            if let Some(existing) = docs.iter_mut().find(|d| d.doc.doc_id == doc.doc_id) {
                existing.doc = doc;
                existing.embedding = embedding;
            } else {
                docs.push(IndexedDoc { doc, embedding });
            }
            written += 1;
        }
        Ok(written)
    }
}
