//! Engine configuration knobs.
//!
//! Every limit from the runtime contract lives here with its default; values
//! can be overridden from the environment (a project `.env` is loaded first,
//! existing process env wins).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// All tunables of the engine core. `Default` carries the documented values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ReAct loop cap.
    pub max_steps: u32,
    /// Per-query tool execution cap.
    pub max_tool_calls_per_query: u32,
    /// LLM gateway cascade depth.
    pub max_fallback_depth: u32,
    /// Per-query cost ceiling in USD.
    pub max_fallback_cost_usd: f64,
    /// Consecutive failures before a model breaker opens.
    pub circuit_breaker_threshold: u32,
    /// Seconds an open breaker waits before half-open.
    pub circuit_breaker_timeout_s: u64,
    /// Concurrent readers per collection.
    pub collection_read_concurrency: usize,
    /// Seconds to wait for a collection write lock.
    pub collection_write_timeout_s: u64,
    /// Concurrent context reads per user.
    pub user_read_concurrency: usize,
    /// Seconds to wait for a per-user write lock.
    pub user_write_timeout_s: u64,
    /// System prompt cache TTL in seconds.
    pub prompt_cache_ttl_s: u64,
    /// Messages kept when trimming conversation history.
    pub context_trim_keep_messages: usize,
    /// History length that triggers summarization.
    pub context_summarize_threshold_messages: usize,
    /// Distinct contributors required to promote a collective fact.
    pub promotion_threshold: u32,
    /// Confidence below which a refuted fact is deleted.
    pub confidence_removal_threshold: f64,
    /// Max promoted facts injected into the prompt.
    pub max_collective_context_facts: usize,
    /// Schema-check stream events before yielding.
    pub event_validation_enabled: bool,
    /// Invalid events tolerated before the stream aborts.
    pub max_event_errors_before_abort: u32,
    /// Wall-clock timeout per tool invocation, seconds.
    pub tool_timeout_s: u64,
    /// Semantic cache entry TTL in seconds.
    pub semantic_cache_ttl_s: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            max_tool_calls_per_query: 10,
            max_fallback_depth: 3,
            max_fallback_cost_usd: 0.10,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_s: 60,
            collection_read_concurrency: 20,
            collection_write_timeout_s: 30,
            user_read_concurrency: 10,
            user_write_timeout_s: 5,
            prompt_cache_ttl_s: 300,
            context_trim_keep_messages: 20,
            context_summarize_threshold_messages: 30,
            promotion_threshold: 3,
            confidence_removal_threshold: 0.2,
            max_collective_context_facts: 10,
            event_validation_enabled: true,
            max_event_errors_before_abort: 10,
            tool_timeout_s: 30,
            semantic_cache_ttl_s: 3600,
        }
    }
}

fn env_override<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden from the environment. Loads a project `.env` first;
    /// existing process env has priority (dotenv never overwrites).
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        let mut cfg = Self::default();
        env_override("PANDU_MAX_STEPS", &mut cfg.max_steps);
        env_override("PANDU_MAX_TOOL_CALLS_PER_QUERY", &mut cfg.max_tool_calls_per_query);
        env_override("PANDU_MAX_FALLBACK_DEPTH", &mut cfg.max_fallback_depth);
        env_override("PANDU_MAX_FALLBACK_COST_USD", &mut cfg.max_fallback_cost_usd);
        env_override("PANDU_CIRCUIT_BREAKER_THRESHOLD", &mut cfg.circuit_breaker_threshold);
        env_override("PANDU_CIRCUIT_BREAKER_TIMEOUT_S", &mut cfg.circuit_breaker_timeout_s);
        env_override("PANDU_COLLECTION_READ_CONCURRENCY", &mut cfg.collection_read_concurrency);
        env_override("PANDU_COLLECTION_WRITE_TIMEOUT_S", &mut cfg.collection_write_timeout_s);
        env_override("PANDU_USER_READ_CONCURRENCY", &mut cfg.user_read_concurrency);
        env_override("PANDU_USER_WRITE_TIMEOUT_S", &mut cfg.user_write_timeout_s);
        env_override("PANDU_PROMPT_CACHE_TTL_S", &mut cfg.prompt_cache_ttl_s);
        env_override("PANDU_CONTEXT_TRIM_KEEP_MESSAGES", &mut cfg.context_trim_keep_messages);
        env_override(
            "PANDU_CONTEXT_SUMMARIZE_THRESHOLD_MESSAGES",
            &mut cfg.context_summarize_threshold_messages,
        );
        env_override("PANDU_PROMOTION_THRESHOLD", &mut cfg.promotion_threshold);
        env_override(
            "PANDU_CONFIDENCE_REMOVAL_THRESHOLD",
            &mut cfg.confidence_removal_threshold,
        );
        env_override("PANDU_MAX_COLLECTIVE_CONTEXT_FACTS", &mut cfg.max_collective_context_facts);
        env_override("PANDU_EVENT_VALIDATION_ENABLED", &mut cfg.event_validation_enabled);
        env_override(
            "PANDU_MAX_EVENT_ERRORS_BEFORE_ABORT",
            &mut cfg.max_event_errors_before_abort,
        );
        env_override("PANDU_TOOL_TIMEOUT_S", &mut cfg.tool_timeout_s);
        env_override("PANDU_SEMANTIC_CACHE_TTL_S", &mut cfg.semantic_cache_ttl_s);
        cfg
    }
}
