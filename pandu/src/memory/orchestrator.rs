//! Memory orchestrator: assembles per-query user context and persists new
//! facts after a turn. Reads share a per-user semaphore; fact writes hold a
//! per-user lock with a timeout that degrades to a no-op instead of
//! failing the query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::message::Message;

use super::{
    CollectiveMemoryService, EpisodicStore, FactExtractor, FactStore, KgEntity, KnowledgeGraph,
    ProfileStore, UserProfile,
};

/// Everything the prompt builder needs about one user, rebuilt per query.
#[derive(Clone, Debug, Default)]
pub struct UserContext {
    pub profile: Option<UserProfile>,
    pub history: Vec<Message>,
    pub facts: Vec<String>,
    pub collective_facts: Vec<String>,
    pub timeline_summary: String,
    pub kg_entities: Vec<KgEntity>,
}

impl UserContext {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Outcome of one background `process_conversation` run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryProcessResult {
    pub facts_extracted: u32,
    pub facts_saved: u32,
    pub processing_time_ms: f64,
    pub success: bool,
}

/// Normalizes the anonymous convention once at the boundary: `None`, empty
/// and the literal "anonymous" all mean no user.
pub fn normalize_user_id(user_id: Option<&str>) -> Option<String> {
    match user_id {
        Some(id) if !id.trim().is_empty() && id != "anonymous" => Some(id.trim().to_string()),
        _ => None,
    }
}

pub struct MemoryOrchestrator {
    profiles: Arc<ProfileStore>,
    facts: Arc<FactStore>,
    episodic: Arc<EpisodicStore>,
    collective: Arc<CollectiveMemoryService>,
    graph: Arc<dyn KnowledgeGraph>,
    extractor: Arc<dyn FactExtractor>,
    read_semaphores: DashMap<String, Arc<Semaphore>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    read_concurrency: usize,
    write_timeout: Duration,
    max_collective_facts: usize,
    history_limit: usize,
    degraded: AtomicBool,
}

impl MemoryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profiles: Arc<ProfileStore>,
        facts: Arc<FactStore>,
        episodic: Arc<EpisodicStore>,
        collective: Arc<CollectiveMemoryService>,
        graph: Arc<dyn KnowledgeGraph>,
        extractor: Arc<dyn FactExtractor>,
        read_concurrency: usize,
        write_timeout: Duration,
        max_collective_facts: usize,
        history_limit: usize,
    ) -> Self {
        Self {
            profiles,
            facts,
            episodic,
            collective,
            graph,
            extractor,
            read_semaphores: DashMap::new(),
            write_locks: DashMap::new(),
            read_concurrency,
            write_timeout,
            max_collective_facts,
            history_limit,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn collective(&self) -> &Arc<CollectiveMemoryService> {
        &self.collective
    }

    pub fn graph(&self) -> &Arc<dyn KnowledgeGraph> {
        &self.graph
    }

    /// Marks the memory backend as degraded; context reads return empty
    /// without raising until it clears.
    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn read_semaphore(&self, user_id: &str) -> Arc<Semaphore> {
        Arc::clone(
            &self
                .read_semaphores
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.read_concurrency))),
        )
    }

    fn write_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            &self
                .write_locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Builds the per-query context. Anonymous users and degraded mode get
    /// an empty context; every partial failure degrades to defaults.
    pub async fn get_user_context(
        &self,
        user_id: &str,
        query: Option<&str>,
        session_id: Option<&str>,
    ) -> UserContext {
        let Some(user_id) = normalize_user_id(Some(user_id)) else {
            debug!("anonymous user, returning empty context");
            return UserContext::empty();
        };
        if self.is_degraded() {
            debug!(user_id = %user_id, "memory degraded, returning empty context");
            return UserContext::empty();
        }

        let semaphore = self.read_semaphore(&user_id);
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return UserContext::empty(),
        };

        let mut context = UserContext::empty();

        match self
            .profiles
            .fetch_profile_and_history(&user_id, session_id, self.history_limit)
            .await
        {
            Ok(Some((profile, history))) => {
                context.profile = Some(profile);
                context.history = history;
            }
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "profile fetch failed"),
        }

        // Memory queries key on the original identifier (email), not the
        // profile's internal id.
        match self.facts.facts(&user_id, 50).await {
            Ok(facts) => context.facts = facts,
            Err(e) => warn!(user_id = %user_id, error = %e, "facts fetch failed"),
        }

        match self
            .collective
            .get_collective_context(None, self.max_collective_facts)
            .await
        {
            Ok(facts) => context.collective_facts = facts,
            Err(e) => warn!(error = %e, "collective context fetch failed"),
        }

        match self.episodic.context_summary(&user_id, 5).await {
            Ok(summary) => context.timeline_summary = summary,
            Err(e) => warn!(user_id = %user_id, error = %e, "timeline fetch failed"),
        }

        if let Some(q) = query {
            context.kg_entities = self.graph.entity_context(q, 5).await;
        }

        info!(
            user_id = %user_id,
            facts = context.facts.len(),
            collective = context.collective_facts.len(),
            history = context.history.len(),
            "user context assembled"
        );
        context
    }

    /// Extracts and persists facts from a completed turn. Never fails the
    /// caller: lock timeouts and store errors return empty counters.
    pub async fn process_conversation(
        &self,
        user_id: &str,
        user_message: &str,
        ai_response: &str,
    ) -> MemoryProcessResult {
        let started = Instant::now();
        let Some(user_id) = normalize_user_id(Some(user_id)) else {
            return MemoryProcessResult::default();
        };

        let lock = self.write_lock(&user_id);
        let guard = match tokio::time::timeout(self.write_timeout, lock.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(user_id = %user_id, "write lock timeout, skipping memory save");
                return MemoryProcessResult {
                    processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                    ..Default::default()
                };
            }
        };

        let raw_facts = self.extractor.extract(user_message, ai_response);
        let facts_extracted = raw_facts.len() as u32;
        let mut facts_saved = 0u32;

        for fact in &raw_facts {
            match self
                .facts
                .add_fact(
                    &user_id,
                    &fact.content,
                    &fact.fact_type,
                    fact.confidence,
                    &fact.source,
                )
                .await
            {
                Ok(true) => facts_saved += 1,
                Ok(false) => {}
                Err(e) => warn!(user_id = %user_id, error = %e, "fact save failed"),
            }
        }

        if let Err(e) = self.facts.increment_counter(&user_id, "conversations").await {
            warn!(user_id = %user_id, error = %e, "counter increment failed");
        }

        if let Err(e) = self
            .episodic
            .extract_and_save_event(&user_id, user_message, ai_response)
            .await
        {
            warn!(user_id = %user_id, error = %e, "episodic save failed");
        }

        drop(guard);

        let result = MemoryProcessResult {
            facts_extracted,
            facts_saved,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            success: true,
        };
        if facts_saved > 0 {
            info!(
                user_id = %user_id,
                saved = facts_saved,
                extracted = facts_extracted,
                "conversation facts saved"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HeuristicFactExtractor, InMemoryKnowledgeGraph};

    fn orchestrator() -> (MemoryOrchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let orch = MemoryOrchestrator::new(
            Arc::new(ProfileStore::new(dir.path().join("p.db")).unwrap()),
            Arc::new(FactStore::new(dir.path().join("f.db")).unwrap()),
            Arc::new(EpisodicStore::new(dir.path().join("e.db")).unwrap()),
            Arc::new(CollectiveMemoryService::new(dir.path().join("c.db"), 3, 0.2).unwrap()),
            Arc::new(InMemoryKnowledgeGraph::with_defaults()),
            Arc::new(HeuristicFactExtractor),
            10,
            Duration::from_secs(5),
            10,
            20,
        );
        (orch, dir)
    }

    #[tokio::test]
    async fn anonymous_variants_return_empty_context() {
        let (orch, _dir) = orchestrator();
        for id in ["anonymous", "", "   "] {
            let ctx = orch.get_user_context(id, None, None).await;
            assert!(ctx.profile.is_none());
            assert!(ctx.facts.is_empty());
        }
    }

    #[tokio::test]
    async fn degraded_mode_returns_empty_without_error() {
        let (orch, _dir) = orchestrator();
        orch.set_degraded(true);
        let ctx = orch.get_user_context("marco@example.com", None, None).await;
        assert!(ctx.facts.is_empty());
        assert!(orch.is_degraded());
    }

    #[tokio::test]
    async fn process_then_read_roundtrip() {
        let (orch, _dir) = orchestrator();
        let result = orch
            .process_conversation(
                "marco@example.com",
                "My name is Marco and my budget is $50k",
                "Noted!",
            )
            .await;
        assert!(result.success);
        assert!(result.facts_saved >= 2);

        let ctx = orch
            .get_user_context("marco@example.com", Some("budget question"), None)
            .await;
        assert!(ctx.facts.iter().any(|f| f.contains("Marco")));
        assert!(!ctx.timeline_summary.is_empty());
    }

    #[tokio::test]
    async fn duplicate_turn_saves_no_new_facts() {
        let (orch, _dir) = orchestrator();
        let turn = "My name is Marco";
        let first = orch.process_conversation("u", turn, "ok").await;
        let second = orch.process_conversation("u", turn, "ok").await;
        assert_eq!(first.facts_saved, 1);
        assert_eq!(second.facts_saved, 0);
        assert!(second.success);
    }

    #[tokio::test]
    async fn kg_entities_resolved_for_query() {
        let (orch, _dir) = orchestrator();
        orch.process_conversation("u", "My name is Anna", "ok").await;
        let ctx = orch
            .get_user_context("u", Some("how do I extend my KITAS?"), None)
            .await;
        assert!(ctx.kg_entities.iter().any(|e| e.name == "KITAS"));
    }
}
