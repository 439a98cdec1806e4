//! Response pipeline: verification → cleaning → citation formatting →
//! light intent-driven shaping. The one-shot self-correction loop that
//! re-prompts the model lives in the reasoning engine; this module is
//! deterministic and idempotent.

mod citations;
mod cleaner;
mod verifier;

pub use citations::{dedup_sources, format_citations};
pub use cleaner::{clean_response, is_stub_response, STUB_PHRASES};
pub use verifier::{LexicalVerifier, Verification, Verifier};

use std::sync::Arc;

use tracing::debug;

use crate::state::SourceRef;

/// Verification threshold below which the engine attempts self-correction.
pub const VERIFICATION_THRESHOLD: f32 = 0.7;

/// Input to one pipeline run.
pub struct PipelineInput {
    pub response: String,
    pub query: String,
    pub context_chunks: Vec<String>,
    pub sources: Vec<SourceRef>,
}

/// Output of one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub response: String,
    pub verification: Verification,
    /// `passed` or `unchecked`; the engine upgrades to `corrected` after a
    /// successful self-correction pass.
    pub verification_status: &'static str,
    pub sources: Vec<SourceRef>,
}

pub struct ResponsePipeline {
    verifier: Arc<dyn Verifier>,
}

impl ResponsePipeline {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier }
    }

    pub fn with_default_verifier() -> Self {
        Self::new(Arc::new(LexicalVerifier))
    }

    pub async fn process(&self, input: PipelineInput) -> PipelineOutcome {
        let verification = self
            .verifier
            .verify(&input.response, &input.query, &input.context_chunks)
            .await;

        let cleaned = clean_response(&input.response);
        let (with_citations, sources) = format_citations(&cleaned, &input.sources);
        let shaped = shape_for_intent(&with_citations, &input.query);

        let verification_status = if input.context_chunks.is_empty() {
            "unchecked"
        } else if verification.score >= VERIFICATION_THRESHOLD {
            "passed"
        } else {
            "unchecked"
        };

        debug!(
            score = verification.score,
            status = verification_status,
            citations = sources.len(),
            "response pipeline completed"
        );

        PipelineOutcome {
            response: shaped,
            verification,
            verification_status,
            sources,
        }
    }
}

/// Light intent-tagged shaping: procedural answers without any list
/// structure get bulletized by sentence; everything else passes through
/// trimmed. Already-structured text is never rewritten.
fn shape_for_intent(response: &str, query: &str) -> String {
    let q = query.to_lowercase();
    let procedural = ["how do", "how to", "come posso", "come faccio", "bagaimana", "steps"]
        .iter()
        .any(|m| q.contains(m));
    let trimmed = response.trim();

    let has_structure = trimmed.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with('-') || l.starts_with('*') || l.chars().next().is_some_and(|c| c.is_ascii_digit())
    });
    if !procedural || has_structure || trimmed.contains("Sources:") {
        return trimmed.to_string();
    }

    let sentences: Vec<&str> = trimmed
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.len() < 3 {
        return trimmed.to_string();
    }
    sentences
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str) -> SourceRef {
        SourceRef {
            id: 1,
            title: title.to_string(),
            url: String::new(),
            score: 0.8,
            collection: "legal_unified".to_string(),
            doc_id: "d1".to_string(),
        }
    }

    #[tokio::test]
    async fn grounded_response_passes() {
        let pipeline = ResponsePipeline::with_default_verifier();
        let out = pipeline
            .process(PipelineInput {
                response: "The PT PMA minimum capital is ten billion IDR.".to_string(),
                query: "PT PMA minimum capital".to_string(),
                context_chunks: vec![
                    "PT PMA minimum capital is ten billion IDR per regulation".to_string(),
                ],
                sources: vec![source("Company Law")],
            })
            .await;
        assert_eq!(out.verification_status, "passed");
        assert!(out.verification.score >= 0.7);
        assert_eq!(out.sources.len(), 1);
    }

    #[tokio::test]
    async fn no_context_is_unchecked() {
        let pipeline = ResponsePipeline::with_default_verifier();
        let out = pipeline
            .process(PipelineInput {
                response: "General advice without retrieval.".to_string(),
                query: "q".to_string(),
                context_chunks: vec![],
                sources: vec![],
            })
            .await;
        assert_eq!(out.verification_status, "unchecked");
    }

    #[tokio::test]
    async fn pipeline_is_idempotent_on_its_own_output() {
        let pipeline = ResponsePipeline::with_default_verifier();
        let context = vec!["The sponsor letter requirement applies to KITAS extension".to_string()];
        let first = pipeline
            .process(PipelineInput {
                response: "Thought: search done.\nKITAS extension requires a sponsor letter."
                    .to_string(),
                query: "kitas extension".to_string(),
                context_chunks: context.clone(),
                sources: vec![source("Visa Guide")],
            })
            .await;
        let second = pipeline
            .process(PipelineInput {
                response: first.response.clone(),
                query: "kitas extension".to_string(),
                context_chunks: context,
                sources: first.sources.clone(),
            })
            .await;
        assert_eq!(first.response, second.response);
        assert_eq!(first.sources, second.sources);
    }
}
