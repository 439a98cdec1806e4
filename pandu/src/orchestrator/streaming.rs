//! Streaming API: the same pipeline as `process_query`, emitting validated
//! events at every stage boundary. Gate responses are streamed
//! token-by-token with a small delay for UX parity with live generation.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::cache::CachedQueryResult;
use crate::engine::ReactRun;
use crate::entity::extract_entities;
use crate::llm::{CostTracker, GatewayError, Tier};
use crate::message::{ImageAttachment, Message};
use crate::state::AgentState;
use crate::stream::{EventEmitter, StreamAbort};
use crate::tools::Tool;
use stream_event::StreamEvent;

use super::routing::{
    detect_team_query, is_conversation_recall_query, wrap_query_with_language_instruction,
};
use super::Orchestrator;

/// Inter-token delay when replaying canned or cached answers.
const TOKEN_DELAY: Duration = Duration::from_millis(10);

/// Channel capacity: small so a slow consumer naturally backpressures the
/// producer.
const STREAM_BUFFER: usize = 8;

impl Orchestrator {
    /// Streams one query as validated events (`status`, `metadata`,
    /// `token`, `sources`, `error`, `done`), each stamped with a
    /// correlation id and timestamp.
    pub fn stream_query(
        self: Arc<Self>,
        query: String,
        user_id: Option<String>,
        conversation_history: Option<Vec<Message>>,
        session_id: Option<String>,
        images: Vec<ImageAttachment>,
    ) -> ReceiverStream<Value> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let mut emitter = EventEmitter::new(
            tx,
            correlation_id,
            self.config.event_validation_enabled,
            self.config.max_event_errors_before_abort,
        );

        let this = Arc::clone(&self);
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                result = this.run_stream(&mut emitter, query, user_id, conversation_history, session_id, images) => {
                    if result.is_err() {
                        info!("stream terminated early");
                    }
                }
                _ = shutdown.cancelled() => {
                    emitter.fatal("shutdown", "Engine is shutting down").await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_stream(
        &self,
        emitter: &mut EventEmitter,
        query: String,
        user_id: Option<String>,
        conversation_history: Option<Vec<Message>>,
        session_id: Option<String>,
        images: Vec<ImageAttachment>,
    ) -> Result<(), StreamAbort> {
        let start = Instant::now();

        if query.trim().is_empty() && images.is_empty() {
            emitter.fatal("validation_error", "query must not be empty").await;
            return Ok(());
        }

        let user_context = self
            .load_user_context(user_id.as_deref(), &query, session_id.as_deref())
            .await;
        let history = self.prepare_history(conversation_history, &user_context).await;

        // Gate cascade: canned responses stream token-by-token.
        if let Some(gate) = self.gates.run_all(&query, &user_context, &history).await {
            emitter
                .metadata(json!({"status": gate.gate_name, "route": gate.route}))
                .await?;
            emitter.stream_text(&gate.response, TOKEN_DELAY).await?;
            emitter.done(Value::Null).await?;
            return Ok(());
        }

        // Team query pre-route: answer directly from the directory.
        if let Some(team_query) = detect_team_query(&query) {
            if self.registry.contains("team_knowledge")
                && self
                    .stream_team_answer(emitter, &query, &team_query, &history)
                    .await?
            {
                return Ok(());
            }
        }

        // Conversation recall: the answer is in the history, not the KB.
        if is_conversation_recall_query(&query) && !history.is_empty() {
            if self.stream_recall_answer(emitter, &query, &history).await? {
                return Ok(());
            }
        }

        // Entities.
        let entities = extract_entities(&query);
        if !entities.is_empty() {
            emitter
                .metadata(json!({"extracted_entities": entities}))
                .await?;
        }

        // Semantic cache.
        if let Some(cached) = self.semantic_cache.get_cached_result(&query).await {
            info!("semantic cache hit (stream)");
            emitter
                .metadata(json!({"status": "cache-hit", "route": "semantic-cache"}))
                .await?;
            emitter.stream_text(&cached.answer, TOKEN_DELAY).await?;
            if !cached.sources.is_empty() {
                let sources = cached
                    .sources
                    .iter()
                    .filter_map(|s| serde_json::to_value(s).ok())
                    .collect();
                emitter.emit(StreamEvent::Sources(sources)).await?;
            }
            emitter
                .done(json!({
                    "execution_time": start.elapsed().as_secs_f64(),
                    "route_used": "semantic-cache",
                }))
                .await?;
            return Ok(());
        }

        emitter.status("processing").await?;

        // Prompt and ReAct loop, with stage-boundary status events.
        let additional_context = self.build_additional_context(&entities, &user_context).await;
        let system_prompt = self
            .prompt_builder
            .build_system_prompt(
                user_id.as_deref().unwrap_or("anonymous"),
                &user_context,
                &query,
                false,
                &additional_context,
            )
            .await;

        let initial_prompt = if query.trim().is_empty() {
            "Please analyze the attached image(s) and describe what they contain.".to_string()
        } else {
            wrap_query_with_language_instruction(&query)
        };

        let tool_counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        let mut state = AgentState::new(&query, "business_complex", self.config.max_steps);
        let outcome = self
            .engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &self.gateway,
                    initial_prompt,
                    system_prompt: &system_prompt,
                    history: &history,
                    tier: Tier::Flash,
                    tool_counter: &tool_counter,
                    images: &images,
                    cost: &mut cost,
                },
                Some(&mut *emitter),
            )
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(GatewayError::AllModelsFailed { warnings }) => {
                warn!(?warnings, "stream failed: all models exhausted");
                emitter
                    .fatal("all_models_failed", "All models in the fallback chain failed")
                    .await;
                return Ok(());
            }
            Err(e) => {
                emitter.fatal("fatal_error", &format!("Stream failed: {e}")).await;
                return Ok(());
            }
        };

        let answer = state.final_answer.clone().unwrap_or_default();
        emitter.stream_text(&answer, TOKEN_DELAY).await?;

        if !state.sources.is_empty() {
            let sources = state
                .sources
                .iter()
                .filter_map(|s| serde_json::to_value(s).ok())
                .collect();
            emitter.emit(StreamEvent::Sources(sources)).await?;
        }

        emitter
            .done(json!({
                "execution_time": start.elapsed().as_secs_f64(),
                "route_used": format!("agentic-rag-stream ({})", outcome.model_used),
                "verification_status": outcome.verification_status,
            }))
            .await?;

        // Cache and persist after the stream completes.
        if !state.sources.is_empty() {
            self.semantic_cache
                .store(
                    &query,
                    CachedQueryResult {
                        answer: answer.clone(),
                        sources: state.sources.clone(),
                    },
                )
                .await;
        }
        self.spawn_memory_save(user_id.as_deref(), &query, &answer);

        Ok(())
    }

    /// Streams a direct answer from the team directory. Returns false to
    /// fall through to the full loop.
    async fn stream_team_answer(
        &self,
        emitter: &mut EventEmitter,
        query: &str,
        team_query: &super::TeamQuery,
        history: &[Message],
    ) -> Result<bool, StreamAbort> {
        info!(query_type = team_query.query_type, "team query pre-route");
        emitter
            .metadata(json!({"status": "team-query", "route": "team-knowledge"}))
            .await?;
        emitter.status("fetching team data").await?;

        let Some(tool) = self.registry.get("team_knowledge") else {
            return Ok(false);
        };
        let team_result = match tool
            .call(json!({
                "query_type": team_query.query_type,
                "search_term": team_query.search_term,
            }))
            .await
        {
            Ok(result) if result.len() > 20 => result,
            Ok(_) | Err(_) => {
                warn!("team pre-route produced nothing, falling back to retrieval");
                return Ok(false);
            }
        };

        let prompt = format!(
            "You are Pandu. Answer this question using the team data below. Be direct and \
             factual. IMPORTANT: respond in the SAME language the user is writing in.\n\n\
             TEAM DATA:\n{team_result}\n\nUSER QUESTION: {query}\n\nAnswer directly."
        );
        let mut messages: Vec<Message> = history.to_vec();
        messages.push(Message::user(prompt));
        let mut cost = CostTracker::default();
        match self
            .gateway
            .send(&messages, "", Tier::Flash, false, &[], &mut cost)
            .await
        {
            Ok(reply) => {
                emitter.stream_text(&reply.text, TOKEN_DELAY).await?;
                emitter.done(json!({"route_used": "team-knowledge"})).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "team pre-route LLM call failed, falling back");
                Ok(false)
            }
        }
    }

    /// Streams a history-grounded answer for recall questions. Returns
    /// false to fall through to the full loop.
    async fn stream_recall_answer(
        &self,
        emitter: &mut EventEmitter,
        query: &str,
        history: &[Message],
    ) -> Result<bool, StreamAbort> {
        info!("conversation recall gate");
        emitter
            .metadata(json!({"status": "recall", "route": "conversation-history"}))
            .await?;
        emitter.status("recalling the conversation").await?;

        let transcript = history
            .iter()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|m| format!("{}: {}", m.role().to_uppercase(), m.content()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are Pandu. The user is asking you to recall something from THIS conversation.\n\
             CRITICAL: the answer is in the CONVERSATION HISTORY below; read it before saying \
             you don't know.\n\nCONVERSATION HISTORY:\n{transcript}\n\nUSER QUESTION: {query}\n\n\
             Answer directly with the names, details and facts the user mentioned. Respond in \
             the SAME language the user is using."
        );

        let mut cost = CostTracker::default();
        match self
            .gateway
            .send(&[Message::user(prompt)], "", Tier::Flash, false, &[], &mut cost)
            .await
        {
            Ok(reply) => {
                emitter.stream_text(&reply.text, TOKEN_DELAY).await?;
                emitter.done(json!({"route_used": "recall-gate"})).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "recall gate LLM call failed, falling back");
                Ok(false)
            }
        }
    }
}
