//! Knowledge-graph search tool: structured relationships for an entity or
//! the entities mentioned in a query.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::memory::KnowledgeGraph;

use super::{Tool, ToolSourceError, ToolSpec};

pub struct KnowledgeGraphSearchTool {
    graph: Arc<dyn KnowledgeGraph>,
}

impl KnowledgeGraphSearchTool {
    pub fn new(graph: Arc<dyn KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for KnowledgeGraphSearchTool {
    fn name(&self) -> &str {
        "knowledge_graph_search"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "knowledge_graph_search".to_string(),
            description: Some(
                "Look up structured relationships between domain entities (visas, permits, \
                 company types, licenses). Use AFTER vector_search for prerequisite or \
                 relationship questions, not instead of it."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entity": {
                        "type": "string",
                        "description": "Entity name to expand (e.g. 'KITAS', 'PT PMA')"
                    },
                    "query": {
                        "type": "string",
                        "description": "Free-text query to extract entities from"
                    }
                },
                "required": []
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError> {
        let entity = args.get("entity").and_then(|v| v.as_str());
        let query = args.get("query").and_then(|v| v.as_str());

        let entities = match (entity, query) {
            (Some(name), _) => self.graph.entity_context(name, 5).await,
            (None, Some(q)) => self.graph.entity_context(q, 5).await,
            (None, None) => {
                return Err(ToolSourceError::InvalidArguments(
                    "either entity or query is required".into(),
                ))
            }
        };

        if entities.is_empty() {
            return Ok(json!({"entities": [], "relationships": []}).to_string());
        }

        let mut relationships = Vec::new();
        for e in &entities {
            for r in self.graph.relations_for(&e.name).await {
                relationships.push(json!({
                    "source": r.source,
                    "relation": r.relation,
                    "target": r.target,
                }));
            }
        }

        Ok(json!({"entities": entities, "relationships": relationships}).to_string())
    }
}
