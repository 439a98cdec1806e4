//! Memory subsystem: per-user facts, episodic timeline, collective
//! knowledge, knowledge-graph lookups and the orchestrator that assembles
//! per-query user context.
//!
//! Persistence is SQLite (single-node); every store degrades gracefully;
//! memory failures never fail a query.

mod collective;
mod episodic;
mod extractor;
mod facts;
mod kg;
mod orchestrator;
mod profile;

pub use collective::{
    content_hash, CollectiveMemory, CollectiveMemoryService, ContributionOutcome,
    RefutationOutcome,
};
pub use episodic::EpisodicStore;
pub use extractor::{FactExtractor, HeuristicFactExtractor, RawFact};
pub use facts::FactStore;
pub use kg::{InMemoryKnowledgeGraph, KgEntity, KgRelation, KnowledgeGraph};
pub use orchestrator::{
    normalize_user_id, MemoryOrchestrator, MemoryProcessResult, UserContext,
};
pub use profile::{ProfileStore, UserProfile};

use thiserror::Error;

/// Persistent-store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
