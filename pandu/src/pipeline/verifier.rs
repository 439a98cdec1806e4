//! Grounding verification: how well is a response supported by the
//! retrieved context?
//!
//! The default implementation is deterministic: lexical overlap between the
//! response's content words and the context. Deployments can plug in an
//! LLM-backed verifier through the same trait.

use std::collections::HashSet;

use async_trait::async_trait;

/// Verification outcome in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct Verification {
    pub score: f32,
    pub reasoning: String,
    pub missing_citations: Vec<String>,
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, response: &str, query: &str, context_chunks: &[String]) -> Verification;
}

const STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "will", "your", "their", "there", "about", "which",
    "would", "could", "should", "been", "were", "they", "them", "than", "then", "into", "also",
    "such", "only", "more", "most", "some", "when", "what", "where", "does", "need", "needs",
];

fn content_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| (t.len() >= 4 && !STOPWORDS.contains(t)) || t.chars().all(|c| c.is_ascii_digit()) && t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// Deterministic lexical-overlap verifier.
pub struct LexicalVerifier;

#[async_trait]
impl Verifier for LexicalVerifier {
    async fn verify(&self, response: &str, _query: &str, context_chunks: &[String]) -> Verification {
        if context_chunks.is_empty() {
            return Verification {
                score: 0.0,
                reasoning: "no retrieved context to verify against".to_string(),
                missing_citations: Vec::new(),
            };
        }

        let response_words = content_words(response);
        if response_words.is_empty() {
            return Verification {
                score: 1.0,
                reasoning: "response has no factual content words".to_string(),
                missing_citations: Vec::new(),
            };
        }

        let mut context_words: HashSet<String> = HashSet::new();
        for chunk in context_chunks {
            context_words.extend(content_words(chunk));
        }

        let mut missing: Vec<String> = response_words
            .iter()
            .filter(|w| !context_words.contains(*w))
            .cloned()
            .collect();
        missing.sort();
        missing.truncate(5);

        let grounded = response_words.len() - response_words
            .iter()
            .filter(|w| !context_words.contains(*w))
            .count();
        let score = grounded as f32 / response_words.len() as f32;

        Verification {
            score,
            reasoning: format!(
                "{grounded}/{} content words grounded in retrieved context",
                response_words.len()
            ),
            missing_citations: missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grounded_response_scores_high() {
        let context = vec![
            "PT PMA minimum capital is ten billion IDR according to company regulation".to_string(),
        ];
        let v = LexicalVerifier
            .verify("The PT PMA minimum capital is ten billion IDR.", "q", &context)
            .await;
        assert!(v.score > 0.9, "score was {}", v.score);
    }

    #[tokio::test]
    async fn fabricated_response_scores_low_with_missing_words() {
        let context = vec!["KITAS extension requires a sponsor letter".to_string()];
        let v = LexicalVerifier
            .verify(
                "Golden visas cost twenty million dollars yearly in Singapore.",
                "q",
                &context,
            )
            .await;
        assert!(v.score < 0.5, "score was {}", v.score);
        assert!(!v.missing_citations.is_empty());
    }

    #[tokio::test]
    async fn empty_context_scores_zero() {
        let v = LexicalVerifier.verify("Any answer.", "q", &[]).await;
        assert_eq!(v.score, 0.0);
    }
}
