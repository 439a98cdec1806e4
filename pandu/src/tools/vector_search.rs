//! Knowledge-base search tool.
//!
//! No keyword routing and no domain mapping here: the model reads the
//! description and picks a collection, or omits it for federated search
//! across everything. The result is a JSON payload with formatted content
//! plus source metadata the engine lifts into citations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::retrieval::HybridRetriever;
use crate::state::SourceRef;

use super::{Tool, ToolSourceError, ToolSpec};

/// Observation text when nothing matched; the early-exit check keys on it.
pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents found.";

const DEFAULT_TOP_K: usize = 8;

pub struct VectorSearchTool {
    retriever: Arc<HybridRetriever>,
}

impl VectorSearchTool {
    pub fn new(retriever: Arc<HybridRetriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn name(&self) -> &str {
        "vector_search"
    }

    fn spec(&self) -> ToolSpec {
        let collections = self.retriever.manager().primary_collections();
        ToolSpec {
            name: "vector_search".to_string(),
            description: Some(
                "Search the knowledge base for verified information.\n\n\
                 DEFAULT: FEDERATED SEARCH - omit 'collection' to search ALL collections at once. \
                 Recommended for complex questions spanning multiple topics.\n\
                 Specify a collection ONLY for focused single-topic queries:\n\
                 - visa_oracle: visas, KITAS, KITAP, immigration, stay permits\n\
                 - legal_unified: laws, company types (PT, CV, Firma), regulations\n\
                 - kbli_unified: business classification codes (KBLI), OSS, NIB\n\
                 - tax_genius: taxes, PPh, PPN, NPWP, fiscal matters\n\
                 - service_pricing: official service pricing and costs\n\
                 - training_conversations: procedures, practical examples"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query in natural language"
                    },
                    "collection": {
                        "type": "string",
                        "enum": collections,
                        "description": "Collection to search; omit to search all"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of results to return (default: 8)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolSourceError::InvalidArguments("query is required".into()))?;
        let collection = args.get("collection").and_then(|v| v.as_str());
        let top_k = args
            .get("top_k")
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(DEFAULT_TOP_K)
            .max(1);

        let outcome = self
            .retriever
            .search(query, 1, top_k, collection)
            .await
            .map_err(|e| ToolSourceError::Execution(e.to_string()))?;

        if outcome.results.is_empty() {
            return Ok(json!({"content": NO_RELEVANT_DOCUMENTS, "sources": []}).to_string());
        }

        let mut formatted = Vec::with_capacity(outcome.results.len());
        let mut sources = Vec::with_capacity(outcome.results.len());
        for (i, chunk) in outcome.results.iter().enumerate() {
            let title = chunk.title.clone().unwrap_or_else(|| "Document".to_string());
            formatted.push(format!(
                "[{}] Source: {} | Title: {}\n{}",
                i + 1,
                chunk.collection,
                title,
                chunk.text
            ));
            sources.push(SourceRef {
                id: (i + 1) as u32,
                title,
                url: String::new(),
                score: chunk.score,
                collection: chunk.collection.clone(),
                doc_id: chunk.doc_id.clone(),
            });
        }

        let payload = json!({
            "content": formatted.join("\n\n"),
            "sources": sources,
        });
        Ok(payload.to_string())
    }
}
