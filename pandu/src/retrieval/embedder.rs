//! Embedder abstraction for the in-process vector index.
//!
//! The production embedding model lives outside the core; tests and
//! single-node deployments use [`HashEmbedder`], a deterministic
//! feature-hashing embedder that needs no network.

use async_trait::async_trait;

use sha2::{Digest, Sha256};

use super::RetrievalError;

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    fn dimensions(&self) -> usize;
}

/// Deterministic feature-hashing embedder: each lowercased token is hashed
/// into one of `dimensions` buckets. Identical texts embed identically, and
/// token overlap produces cosine similarity, which is all the in-memory
/// index needs.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let e = HashEmbedder::default();
        let a = e.embed("KITAS extension sponsor").await.unwrap();
        let b = e.embed("KITAS extension sponsor").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn overlapping_text_is_closer_than_disjoint() {
        let e = HashEmbedder::default();
        let q = e.embed("visa extension process").await.unwrap();
        let near = e.embed("the extension process for a visa").await.unwrap();
        let far = e.embed("restaurant menu pasta").await.unwrap();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&q, &near) > dot(&q, &far));
    }
}
