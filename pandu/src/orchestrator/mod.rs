//! The orchestrator: composes gates, entity extraction, the semantic
//! cache, prompt building, the ReAct engine, the response pipeline and
//! background memory writes behind the blocking and streaming APIs.

mod routing;
mod streaming;

pub use routing::{
    detect_team_query, is_conversation_recall_query, wrap_query_with_language_instruction,
    TeamQuery,
};

use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::cache::{CachedQueryResult, SemanticCache};
use crate::config::EngineConfig;
use crate::context::ContextWindowManager;
use crate::engine::{ReactRun, ReasoningEngine};
use crate::entity::{extract_entities, Entities};
use crate::error::EngineError;
use crate::gates::{
    ClarificationService, DomainClassifier, GateResult, HeuristicDomainClassifier, QueryGates,
};
use crate::llm::{CostTracker, GatewayError, LlmGateway, RegisteredModel, Tier};
use crate::memory::{normalize_user_id, MemoryOrchestrator, UserContext};
use crate::message::Message;
use crate::pipeline::{LexicalVerifier, ResponsePipeline, Verifier};
use crate::prompt::SystemPromptBuilder;
use crate::retrieval::HybridRetriever;
use crate::state::{AgentState, SourceRef};
use crate::tools::{
    CalculatorTool, KnowledgeGraphSearchTool, PricingLookupTool, PricingStore, TeamDirectory,
    TeamKnowledgeTool, Tool, ToolExecutor, ToolRegistry, VectorSearchTool, WebSearchTool,
};

/// Result of one query through the core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoreResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub model_used: String,
    pub verification_status: String,
    pub verification_score: f32,
    pub evidence_score: f32,
    pub is_ambiguous: bool,
    pub clarification_question: Option<String>,
    pub entities: Entities,
    pub cache_hit: bool,
    pub document_count: usize,
    pub context_used: usize,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub timings: HashMap<String, f64>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl CoreResult {
    fn from_gate(gate: GateResult, elapsed: Duration) -> Self {
        let blocked = gate.verification_status == "blocked";
        let mut timings = HashMap::new();
        timings.insert("total".to_string(), elapsed.as_secs_f64());
        Self {
            answer: gate.response.clone(),
            sources: Vec::new(),
            model_used: gate.route,
            verification_status: gate.verification_status.to_string(),
            verification_score: if blocked { 0.0 } else { 1.0 },
            evidence_score: if blocked || gate.is_ambiguous { 0.0 } else { 1.0 },
            is_ambiguous: gate.is_ambiguous,
            clarification_question: gate.is_ambiguous.then_some(gate.response),
            timings,
            warnings: gate.warnings,
            ..Default::default()
        }
    }
}

/// Builds an [`Orchestrator`] from its components. Models, retriever and
/// memory are required; everything else has sensible defaults.
pub struct OrchestratorBuilder {
    config: EngineConfig,
    models: Vec<RegisteredModel>,
    retriever: Option<Arc<HybridRetriever>>,
    memory: Option<Arc<MemoryOrchestrator>>,
    pricing: Option<Arc<PricingStore>>,
    team: Option<Arc<TeamDirectory>>,
    clarification: Option<Arc<dyn ClarificationService>>,
    domain: Option<Arc<dyn DomainClassifier>>,
    verifier: Option<Arc<dyn Verifier>>,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            models: Vec::new(),
            retriever: None,
            memory: None,
            pricing: None,
            team: None,
            clarification: None,
            domain: None,
            verifier: None,
            extra_tools: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn models(mut self, models: Vec<RegisteredModel>) -> Self {
        self.models = models;
        self
    }

    pub fn retriever(mut self, retriever: Arc<HybridRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn memory(mut self, memory: Arc<MemoryOrchestrator>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn pricing(mut self, pricing: Arc<PricingStore>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn team(mut self, team: Arc<TeamDirectory>) -> Self {
        self.team = Some(team);
        self
    }

    pub fn clarification(mut self, service: Arc<dyn ClarificationService>) -> Self {
        self.clarification = Some(service);
        self
    }

    pub fn domain_classifier(mut self, classifier: Arc<dyn DomainClassifier>) -> Self {
        self.domain = Some(classifier);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn build(self) -> Result<Orchestrator, EngineError> {
        if self.models.is_empty() {
            return Err(EngineError::Validation("at least one model is required".into()));
        }
        let retriever = self
            .retriever
            .ok_or_else(|| EngineError::Validation("retriever is required".into()))?;
        let memory = self
            .memory
            .ok_or_else(|| EngineError::Validation("memory orchestrator is required".into()))?;

        let config = self.config;
        let gateway = Arc::new(LlmGateway::new(self.models, &config));

        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(VectorSearchTool::new(Arc::clone(&retriever))),
            Arc::new(PricingLookupTool::new(
                self.pricing
                    .unwrap_or_else(|| Arc::new(PricingStore::with_defaults())),
            )),
            Arc::new(TeamKnowledgeTool::new(
                self.team.unwrap_or_else(|| Arc::new(TeamDirectory::with_defaults())),
            )),
            Arc::new(CalculatorTool),
            Arc::new(WebSearchTool::from_env()),
            Arc::new(KnowledgeGraphSearchTool::new(Arc::clone(memory.graph()))),
        ];
        tools.extend(self.extra_tools);
        let registry = Arc::new(ToolRegistry::new(tools));
        gateway.set_tool_specs(registry.specs());

        let executor = Arc::new(ToolExecutor::new(
            Arc::clone(&registry),
            config.max_tool_calls_per_query,
            Duration::from_secs(config.tool_timeout_s),
        ));
        let pipeline = Arc::new(ResponsePipeline::new(
            self.verifier.unwrap_or_else(|| Arc::new(LexicalVerifier)),
        ));
        let engine = ReasoningEngine::new(executor, pipeline);

        Ok(Orchestrator {
            prompt_builder: Arc::new(SystemPromptBuilder::new(Duration::from_secs(
                config.prompt_cache_ttl_s,
            ))),
            gates: QueryGates::new(
                self.clarification,
                self.domain.unwrap_or_else(|| Arc::new(HeuristicDomainClassifier)),
            ),
            semantic_cache: Arc::new(SemanticCache::new(Duration::from_secs(
                config.semantic_cache_ttl_s,
            ))),
            context_window: ContextWindowManager::new(
                config.context_trim_keep_messages,
                config.context_summarize_threshold_messages,
            ),
            registry,
            engine,
            gateway,
            retriever,
            memory,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Orchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) gateway: Arc<LlmGateway>,
    pub(crate) gates: QueryGates,
    pub(crate) prompt_builder: Arc<SystemPromptBuilder>,
    pub(crate) engine: ReasoningEngine,
    pub(crate) memory: Arc<MemoryOrchestrator>,
    pub(crate) semantic_cache: Arc<SemanticCache>,
    pub(crate) context_window: ContextWindowManager,
    pub(crate) registry: Arc<ToolRegistry>,
    #[allow(dead_code)]
    pub(crate) retriever: Arc<HybridRetriever>,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn gateway(&self) -> &Arc<LlmGateway> {
        &self.gateway
    }

    pub fn semantic_cache(&self) -> &Arc<SemanticCache> {
        &self.semantic_cache
    }

    pub fn memory(&self) -> &Arc<MemoryOrchestrator> {
        &self.memory
    }

    /// Loads user context, never failing the query.
    pub(crate) async fn load_user_context(
        &self,
        user_id: Option<&str>,
        query: &str,
        session_id: Option<&str>,
    ) -> UserContext {
        match normalize_user_id(user_id) {
            Some(id) => {
                self.memory
                    .get_user_context(&id, Some(query), session_id)
                    .await
            }
            None => UserContext::empty(),
        }
    }

    /// Picks the working history (explicit beats stored) and trims or
    /// summarizes it.
    pub(crate) async fn prepare_history(
        &self,
        conversation_history: Option<Vec<Message>>,
        context: &UserContext,
    ) -> Vec<Message> {
        let history = conversation_history.unwrap_or_else(|| context.history.clone());
        if history.is_empty() {
            return history;
        }
        self.context_window
            .prepare_history(&self.gateway, &history)
            .await
    }

    /// Schedules the background memory write; never blocks the caller.
    pub(crate) fn spawn_memory_save(&self, user_id: Option<&str>, query: &str, answer: &str) {
        let Some(user_id) = normalize_user_id(user_id) else {
            return;
        };
        if answer.is_empty() {
            return;
        }
        let memory = Arc::clone(&self.memory);
        let query = query.to_string();
        let answer = answer.to_string();
        // Saves are short (bounded by the per-user write-lock timeout), so
        // shutdown drains them instead of aborting mid-write.
        self.tracker.spawn(async move {
            let result = memory.process_conversation(&user_id, &query, &answer).await;
            if !result.success {
                warn!(user_id = %user_id, "background memory save was a no-op");
            }
        });
    }

    /// Additional prompt context: extracted entities plus knowledge-graph
    /// relationships for the mentioned entities.
    pub(crate) async fn build_additional_context(
        &self,
        entities: &Entities,
        context: &UserContext,
    ) -> String {
        let mut out = String::new();
        if !entities.is_empty() {
            let rendered = entities
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "\nKNOWN ENTITIES (use strict filtering if possible): {rendered}"
            ));
        }
        let graph = self.memory.graph();
        let mut relations = Vec::new();
        for entity in &context.kg_entities {
            for r in graph.relations_for(&entity.name).await {
                relations.push(format!("{} {} {}", r.source, r.relation, r.target));
            }
        }
        if !relations.is_empty() {
            relations.sort();
            relations.dedup();
            out.push_str(&format!("\nKNOWN RELATIONSHIPS: {}", relations.join("; ")));
        }
        out
    }

    /// Per-stage timing breakdown from the executed steps.
    pub(crate) fn timing_breakdown(
        state: &AgentState,
        total: Duration,
        reasoning: Duration,
    ) -> HashMap<String, f64> {
        let mut tool_latency = 0.0;
        let mut search_latency = 0.0;
        for step in &state.steps {
            if let Some(action) = &step.action {
                tool_latency += action.execution_time;
                if action.tool_name == "vector_search" {
                    search_latency += action.execution_time;
                }
            }
        }
        let reasoning_s = reasoning.as_secs_f64();
        let mut timings = HashMap::new();
        timings.insert("total".to_string(), total.as_secs_f64());
        timings.insert("reasoning".to_string(), reasoning_s);
        timings.insert("tools".to_string(), tool_latency);
        timings.insert("search".to_string(), search_latency);
        timings.insert("llm".to_string(), (reasoning_s - tool_latency).max(0.0));
        timings
    }

    /// Blocking API: runs the full pipeline and returns a [`CoreResult`].
    pub async fn process_query(
        &self,
        query: &str,
        user_id: Option<&str>,
        conversation_history: Option<Vec<Message>>,
        session_id: Option<&str>,
    ) -> Result<CoreResult, EngineError> {
        let start = Instant::now();
        if query.trim().is_empty() {
            return Err(EngineError::Validation("query must not be empty".into()));
        }
        let tool_counter = AtomicU32::new(0);

        // 1. Context (tolerant of failure) and history preparation.
        let user_context = self.load_user_context(user_id, query, session_id).await;
        let history = self.prepare_history(conversation_history, &user_context).await;

        // 2. Gate cascade.
        if let Some(gate) = self.gates.run_all(query, &user_context, &history).await {
            return Ok(CoreResult::from_gate(gate, start.elapsed()));
        }

        // 3. Entity extraction.
        let entities = extract_entities(query);

        // 4. Semantic cache.
        if let Some(cached) = self.semantic_cache.get_cached_result(query).await {
            info!("semantic cache hit");
            let mut timings = HashMap::new();
            timings.insert("total".to_string(), start.elapsed().as_secs_f64());
            return Ok(CoreResult {
                answer: cached.answer,
                document_count: cached.sources.len(),
                sources: cached.sources,
                model_used: "cache".to_string(),
                verification_status: "passed".to_string(),
                verification_score: 1.0,
                evidence_score: 1.0,
                cache_hit: true,
                entities,
                timings,
                ..Default::default()
            });
        }

        // 5. System prompt.
        let additional_context = self.build_additional_context(&entities, &user_context).await;
        let system_prompt = self
            .prompt_builder
            .build_system_prompt(
                user_id.unwrap_or("anonymous"),
                &user_context,
                query,
                false,
                &additional_context,
            )
            .await;

        // 6. ReAct loop.
        let mut state = AgentState::new(query, "business_complex", self.config.max_steps);
        let mut cost = CostTracker::default();
        let loop_start = Instant::now();
        let outcome = self
            .engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &self.gateway,
                    initial_prompt: wrap_query_with_language_instruction(query),
                    system_prompt: &system_prompt,
                    history: &history,
                    tier: Tier::Pro,
                    tool_counter: &tool_counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await;
        let reasoning = loop_start.elapsed();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(GatewayError::AllModelsFailed { warnings }) => {
                let mut timings = HashMap::new();
                timings.insert("total".to_string(), start.elapsed().as_secs_f64());
                return Ok(CoreResult {
                    answer: "I'm temporarily unable to reach my language models. Please try \
                             again in a moment."
                        .to_string(),
                    model_used: "none".to_string(),
                    verification_status: "skipped".to_string(),
                    entities,
                    timings,
                    warnings,
                    error: Some("all models in fallback chain failed".to_string()),
                    ..Default::default()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let answer = state.final_answer.clone().unwrap_or_default();
        let context_used: usize = state
            .steps
            .iter()
            .map(|s| s.observation.as_deref().map_or(0, str::len))
            .sum();

        // 7. Populate the result.
        let result = CoreResult {
            answer: answer.clone(),
            document_count: state.sources.len(),
            sources: state.sources.clone(),
            model_used: outcome.model_used,
            verification_status: outcome.verification_status,
            verification_score: state.verification_score,
            evidence_score: state.evidence_score,
            entities,
            context_used,
            prompt_tokens: state.usage.prompt_tokens,
            completion_tokens: state.usage.completion_tokens,
            total_tokens: state.usage.total_tokens,
            cost_usd: state.usage.cost_usd,
            timings: Self::timing_breakdown(&state, start.elapsed(), reasoning),
            ..Default::default()
        };

        // 8. Cache verified answers for replay.
        if result.verification_status == "passed" && !result.sources.is_empty() {
            self.semantic_cache
                .store(
                    query,
                    CachedQueryResult {
                        answer: answer.clone(),
                        sources: result.sources.clone(),
                    },
                )
                .await;
        }

        // 9. Persist facts in the background; never block the caller.
        self.spawn_memory_save(user_id, query, &answer);

        Ok(result)
    }

    /// Cancels background work and waits for in-flight memory saves.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("orchestrator shut down");
    }
}
