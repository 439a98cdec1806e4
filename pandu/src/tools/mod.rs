//! Tool subsystem: the tool contract, the static registry, call parsing and
//! the rate-limited executor.
//!
//! Each tool has a unique name, a spec (description + JSON schema for the
//! model) and an async `call`. Tools must be idempotent for identical
//! arguments and never touch agent state; the executor attaches results to
//! the pending [`ToolCall`](crate::state::ToolCall).

mod calculator;
mod executor;
mod kg_search;
mod parse;
mod pricing;
mod team;
mod vector_search;
mod web_search;

pub use calculator::CalculatorTool;
pub use executor::ToolExecutor;
pub use kg_search::KnowledgeGraphSearchTool;
pub use parse::{parse_inline_tool_call, parse_tool_call};
pub use pricing::{PriceRecord, PricingLookupTool, PricingStore};
pub use team::{TeamDirectory, TeamKnowledgeTool, TeamMember};
pub use vector_search::{VectorSearchTool, NO_RELEVANT_DOCUMENTS};
pub use web_search::{WebSearchTool, WEB_DISCLAIMER};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Tool failure surfaced to the executor (which turns it into a short
/// observation, never a query failure).
#[derive(Debug, Error)]
pub enum ToolSourceError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Specification for one tool: what the model sees.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON-schema-like object with typed properties and a required list.
    pub input_schema: serde_json::Value,
}

/// A single callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; used for dispatch and native function-calling schemas.
    fn name(&self) -> &str;

    /// Spec shown to the model.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool. Returns a plain string or JSON-serialized payload.
    async fn call(&self, args: serde_json::Value) -> Result<String, ToolSourceError>;
}

/// Static tool registry, fixed for the process lifetime.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Specs for every registered tool, sorted by name for stable prompts.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
