//! # Pandu
//!
//! The core of an agentic Retrieval-Augmented Generation engine for a
//! multi-tenant business-knowledge assistant (Indonesian visas, company
//! setup, tax, legal, pricing, team). The engine answers natural-language
//! queries by orchestrating a Reason-Act-Observe loop over a pluggable tool
//! set, with per-user memory, cross-user collective knowledge, semantic
//! caching and streaming delivery.
//!
//! ## Architecture
//!
//! The blocking path is `Query → Gates → EntityExtract → (CacheHit?) →
//! PromptBuild → ReActLoop{LLM → Tool → Observation}* → ResponsePipeline →
//! MemoryWrite(background) → CoreResult`. The streaming path is identical
//! but emits validated events at every stage boundary.
//!
//! - **Gate cascade** ([`gates`]): security, greeting, casual, identity,
//!   clarification and out-of-domain checks that short-circuit trivial
//!   inputs before any model call.
//! - **LLM gateway** ([`llm`]): tier routing over [`ModelClient`]
//!   implementations with per-model circuit breakers, a fallback cascade,
//!   per-query cost/depth caps and token accounting.
//! - **Tools** ([`tools`]): the [`Tool`] contract, the static registry,
//!   native + inline call parsing, and the rate-limited executor. Ships
//!   `vector_search`, `pricing_lookup`, `team_knowledge`, `calculator`,
//!   `web_search` and `knowledge_graph_search`.
//! - **Retrieval** ([`retrieval`]): collection registry with per-collection
//!   read/write locking and the hybrid retriever with federated search.
//! - **Memory** ([`memory`]): per-user facts, episodic timeline, collective
//!   facts with a promotion threshold, knowledge-graph lookups, and the
//!   orchestrator that assembles per-query context.
//! - **Prompting** ([`prompt`]): cache-keyed system prompt assembly with
//!   persona overlays and language heuristics ([`lang`]).
//! - **Reasoning** ([`engine`]): the ReAct loop with early exit, synthesis
//!   fallback, stub filtering and one-shot self-correction.
//! - **Response pipeline** ([`pipeline`]): verification → cleaning →
//!   citation formatting → light shaping.
//! - **Orchestrator** ([`orchestrator`]): composes everything behind
//!   [`Orchestrator::process_query`] and [`Orchestrator::stream_query`].
//! - **Streaming** ([`stream`] + the `stream-event` crate): validated,
//!   bounded event emission with typed error events.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pandu::config::EngineConfig;
//! use pandu::llm::{MockModel, ModelPrice, RegisteredModel, Tier};
//! use pandu::memory::{
//!     CollectiveMemoryService, EpisodicStore, FactStore, HeuristicFactExtractor,
//!     InMemoryKnowledgeGraph, MemoryOrchestrator, ProfileStore,
//! };
//! use pandu::orchestrator::Orchestrator;
//! use pandu::retrieval::{
//!     default_collections, CollectionManager, HashEmbedder, HybridRetriever, InMemoryVectorIndex,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_env();
//! let manager = Arc::new(CollectionManager::new(
//!     default_collections(),
//!     |_| Arc::new(InMemoryVectorIndex::new(Arc::new(HashEmbedder::default()))),
//!     config.collection_read_concurrency,
//!     Duration::from_secs(config.collection_write_timeout_s),
//! ));
//! let memory = Arc::new(MemoryOrchestrator::new(
//!     Arc::new(ProfileStore::new("data/profiles.db")?),
//!     Arc::new(FactStore::new("data/facts.db")?),
//!     Arc::new(EpisodicStore::new("data/episodic.db")?),
//!     Arc::new(CollectiveMemoryService::new("data/collective.db", 3, 0.2)?),
//!     Arc::new(InMemoryKnowledgeGraph::with_defaults()),
//!     Arc::new(HeuristicFactExtractor),
//!     config.user_read_concurrency,
//!     Duration::from_secs(config.user_write_timeout_s),
//!     config.max_collective_context_facts,
//!     config.context_trim_keep_messages,
//! ));
//! let orchestrator = Orchestrator::builder()
//!     .config(config)
//!     .models(vec![RegisteredModel {
//!         tier: Tier::Flash,
//!         client: Arc::new(MockModel::with_text("demo", "Final Answer: hello")),
//!         price: ModelPrice::free(),
//!     }])
//!     .retriever(Arc::new(HybridRetriever::new(manager)))
//!     .memory(memory)
//!     .build()?;
//!
//! let result = orchestrator
//!     .process_query("What is the PT PMA minimum capital?", Some("marco@example.com"), None, None)
//!     .await?;
//! println!("{} ({})", result.answer, result.model_used);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod entity;
pub mod error;
pub mod gates;
pub mod lang;
pub mod llm;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod state;
pub mod stream;
pub mod tools;

pub use cache::{Cache, CacheError, CachedQueryResult, InMemoryCache, SemanticCache};
pub use config::EngineConfig;
pub use context::ContextWindowManager;
pub use engine::{ReactOutcome, ReactRun, ReasoningEngine};
pub use entity::{extract_entities, Entities};
pub use error::EngineError;
pub use gates::{
    Ambiguity, ClarificationService, DomainClassifier, GateResult, HeuristicDomainClassifier,
    QueryGates,
};
pub use lang::Lang;
pub use llm::{
    CircuitBreaker, CostTracker, GatewayError, GatewayReply, LlmGateway, MockModel, ModelClient,
    ModelError, ModelPrice, ModelRequest, ModelResponse, ModelUsage, NativeToolCall, OpenAiModel,
    RegisteredModel, Tier,
};
pub use memory::{
    CollectiveMemoryService, ContributionOutcome, EpisodicStore, FactExtractor, FactStore,
    HeuristicFactExtractor, InMemoryKnowledgeGraph, KgEntity, KnowledgeGraph, MemoryOrchestrator,
    MemoryProcessResult, ProfileStore, RefutationOutcome, StoreError, UserContext, UserProfile,
};
pub use message::{ImageAttachment, Message};
pub use orchestrator::{CoreResult, Orchestrator, OrchestratorBuilder};
pub use pipeline::{LexicalVerifier, ResponsePipeline, Verification, Verifier};
pub use prompt::SystemPromptBuilder;
pub use retrieval::{
    default_collections, CollectionDefinition, CollectionManager, Document, Embedder,
    HashEmbedder, HybridRetriever, InMemoryVectorIndex, RetrievalError, RetrievedChunk,
    ScoredChunk, VectorStore,
};
pub use state::{AgentState, AgentStep, SourceRef, TokenUsage, ToolCall};
pub use stream::EventEmitter;
pub use tools::{
    CalculatorTool, KnowledgeGraphSearchTool, PricingLookupTool, PricingStore, TeamDirectory,
    TeamKnowledgeTool, Tool, ToolExecutor, ToolRegistry, ToolSourceError, ToolSpec,
    VectorSearchTool, WebSearchTool,
};

/// When running `cargo test -p pandu`, initializes tracing from `RUST_LOG`
/// so unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
