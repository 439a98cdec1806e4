//! Per-query agent state: the ReAct transcript, gathered context, citations
//! and token accounting. Created on query entry, discarded on exit.

use serde::{Deserialize, Serialize};

/// A retrieval citation attached to the final answer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub score: f32,
    pub collection: String,
    #[serde(default)]
    pub doc_id: String,
}

/// One tool invocation requested by the model, populated by the executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: Option<String>,
    /// Wall-clock execution time in seconds, recorded by the executor.
    pub execution_time: f64,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result: None,
            execution_time: 0.0,
        }
    }
}

/// One Thought → Action → Observation step. Immutable once appended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentStep {
    pub step_number: u32,
    pub thought: String,
    pub action: Option<ToolCall>,
    pub observation: Option<String>,
    pub is_final: bool,
}

/// Token usage and cost, monotonically accumulated per query.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cost_usd += other.cost_usd;
    }
}

/// Mutable state of one query's reasoning loop.
#[derive(Clone, Debug)]
pub struct AgentState {
    pub query: String,
    pub intent_type: String,
    pub current_step: u32,
    pub max_steps: u32,
    pub steps: Vec<AgentStep>,
    pub context_gathered: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub final_answer: Option<String>,
    pub verification_score: f32,
    pub evidence_score: f32,
    pub usage: TokenUsage,
}

impl AgentState {
    pub fn new(query: impl Into<String>, intent_type: impl Into<String>, max_steps: u32) -> Self {
        Self {
            query: query.into(),
            intent_type: intent_type.into(),
            current_step: 0,
            max_steps,
            steps: Vec::new(),
            context_gathered: Vec::new(),
            sources: Vec::new(),
            final_answer: None,
            verification_score: 0.0,
            evidence_score: 0.0,
            usage: TokenUsage::default(),
        }
    }

    /// Appends a step, preserving issue order.
    pub fn push_step(&mut self, step: AgentStep) {
        self.steps.push(step);
    }

    /// The last recorded observation, if any.
    pub fn last_observation(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find_map(|s| s.observation.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cost_usd: 0.001,
        });
        total.add(TokenUsage {
            prompt_tokens: 7,
            completion_tokens: 3,
            total_tokens: 10,
            cost_usd: 0.002,
        });
        assert_eq!(total.prompt_tokens, 17);
        assert_eq!(total.total_tokens, 25);
        assert!((total.cost_usd - 0.003).abs() < 1e-9);
    }

    #[test]
    fn last_observation_skips_thought_only_steps() {
        let mut state = AgentState::new("q", "business", 6);
        state.push_step(AgentStep {
            step_number: 1,
            thought: "think".into(),
            action: None,
            observation: Some("obs-1".into()),
            is_final: false,
        });
        state.push_step(AgentStep {
            step_number: 2,
            thought: "more".into(),
            action: None,
            observation: None,
            is_final: false,
        });
        assert_eq!(state.last_observation(), Some("obs-1"));
    }
}
