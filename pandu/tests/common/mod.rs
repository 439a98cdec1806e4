//! Shared fixtures for integration tests: an orchestrator wired from mock
//! models, an in-memory retrieval stack and temp-file SQLite stores.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pandu::config::EngineConfig;
use pandu::llm::{MockModel, ModelPrice, RegisteredModel, Tier};
use pandu::memory::{
    CollectiveMemoryService, EpisodicStore, FactStore, HeuristicFactExtractor,
    InMemoryKnowledgeGraph, MemoryOrchestrator, ProfileStore, UserProfile,
};
use pandu::orchestrator::Orchestrator;
use pandu::retrieval::{
    default_collections, CollectionManager, Document, HashEmbedder, HybridRetriever,
    InMemoryVectorIndex,
};

/// A realistic legal chunk, long enough to trip the early-exit check.
pub const PMA_DOC: &str = "PT PMA minimum capital is ten billion IDR. The paid-up portion must \
be at least two and a half billion IDR unless a sector regulation says otherwise. Shareholders \
can be foreign individuals or corporations. The company must obtain an NIB through OSS and \
register for tax with a NPWP. Certain sectors on the priority list allow full foreign ownership \
while others cap it; check the applicable KBLI entry before incorporating. Minimum investment \
plans above the capital threshold are reviewed by BKPM before the deed is issued.";

pub struct Fixture {
    pub orchestrator: Arc<Orchestrator>,
    pub memory: Arc<MemoryOrchestrator>,
    pub retriever: Arc<HybridRetriever>,
    // Temp dir must outlive the SQLite stores.
    _dir: tempfile::TempDir,
}

pub async fn memory_orchestrator(dir: &tempfile::TempDir) -> Arc<MemoryOrchestrator> {
    let config = EngineConfig::default();
    Arc::new(MemoryOrchestrator::new(
        Arc::new(ProfileStore::new(dir.path().join("profiles.db")).unwrap()),
        Arc::new(FactStore::new(dir.path().join("facts.db")).unwrap()),
        Arc::new(EpisodicStore::new(dir.path().join("episodic.db")).unwrap()),
        Arc::new(
            CollectiveMemoryService::new(
                dir.path().join("collective.db"),
                config.promotion_threshold,
                config.confidence_removal_threshold,
            )
            .unwrap(),
        ),
        Arc::new(InMemoryKnowledgeGraph::with_defaults()),
        Arc::new(HeuristicFactExtractor),
        config.user_read_concurrency,
        Duration::from_secs(config.user_write_timeout_s),
        config.max_collective_context_facts,
        config.context_trim_keep_messages,
    ))
}

pub async fn retriever_with_pma_doc() -> Arc<HybridRetriever> {
    let manager = Arc::new(CollectionManager::new(
        default_collections(),
        |_| Arc::new(InMemoryVectorIndex::new(Arc::new(HashEmbedder::default()))),
        20,
        Duration::from_secs(30),
    ));
    manager
        .ingest_with_lock(
            "legal_unified",
            vec![Document {
                doc_id: "pma-law".into(),
                title: Some("Company Law".into()),
                text: PMA_DOC.into(),
            }],
        )
        .await
        .unwrap();
    Arc::new(HybridRetriever::new(manager))
}

/// Builds a full orchestrator around the given mock models, seeds a profile
/// for `marco@example.com` (name "Marco").
pub async fn fixture_with_models(models: Vec<RegisteredModel>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let memory = memory_orchestrator(&dir).await;
    let retriever = retriever_with_pma_doc().await;

    let profiles = ProfileStore::new(dir.path().join("profiles.db")).unwrap();
    profiles
        .upsert_profile(UserProfile {
            id: "u-marco".into(),
            email: Some("marco@example.com".into()),
            name: Some("Marco".into()),
            role: Some("Entrepreneur".into()),
            department: None,
            language_pref: Some("it".into()),
            notes: None,
        })
        .await
        .unwrap();

    let orchestrator = Arc::new(
        Orchestrator::builder()
            .models(models)
            .retriever(Arc::clone(&retriever))
            .memory(Arc::clone(&memory))
            .build()
            .unwrap(),
    );

    Fixture {
        orchestrator,
        memory,
        retriever,
        _dir: dir,
    }
}

/// One mock model registered at the Flash tier.
pub fn flash(model: MockModel) -> RegisteredModel {
    RegisteredModel {
        tier: Tier::Flash,
        client: Arc::new(model),
        price: ModelPrice::new(0.001, 0.002),
    }
}

/// One mock model registered at the Fallback tier.
pub fn fallback(model: MockModel) -> RegisteredModel {
    RegisteredModel {
        tier: Tier::Fallback,
        client: Arc::new(model),
        price: ModelPrice::new(0.0005, 0.001),
    }
}
