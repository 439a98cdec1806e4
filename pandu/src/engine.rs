//! ReAct reasoning engine: the Thought → Action → Observation loop with
//! early exit on sufficient retrieval, final-answer synthesis, stub
//! filtering, and the one-shot self-correction pass over the response
//! pipeline.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::lang::{self, Lang};
use crate::llm::{CostTracker, GatewayError, LlmGateway, Tier};
use crate::message::{ImageAttachment, Message};
use crate::pipeline::{
    is_stub_response, PipelineInput, ResponsePipeline, VERIFICATION_THRESHOLD,
};
use crate::state::{AgentState, AgentStep, SourceRef};
use crate::stream::EventEmitter;
use crate::tools::{parse_tool_call, ToolExecutor, NO_RELEVANT_DOCUMENTS};

/// Observation length beyond which retrieval is considered sufficient and
/// the loop exits early to save cost.
const EARLY_EXIT_OBSERVATION_CHARS: usize = 500;

/// Marker the model uses to end the loop without a tool call.
const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Everything one loop run needs besides the agent state.
pub struct ReactRun<'a> {
    pub gateway: &'a LlmGateway,
    pub initial_prompt: String,
    pub system_prompt: &'a str,
    pub history: &'a [Message],
    pub tier: Tier,
    pub tool_counter: &'a AtomicU32,
    pub images: &'a [ImageAttachment],
    pub cost: &'a mut CostTracker,
}

/// Loop result: which model produced the final answer.
#[derive(Debug)]
pub struct ReactOutcome {
    pub model_used: String,
    pub verification_status: String,
}

pub struct ReasoningEngine {
    executor: Arc<ToolExecutor>,
    pipeline: Arc<ResponsePipeline>,
}

impl ReasoningEngine {
    pub fn new(executor: Arc<ToolExecutor>, pipeline: Arc<ResponsePipeline>) -> Self {
        Self { executor, pipeline }
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Runs the ReAct loop, then the response pipeline (with one
    /// self-correction attempt). Emits status events when an emitter is
    /// supplied; the blocking path passes `None`.
    pub async fn execute_react_loop(
        &self,
        state: &mut AgentState,
        run: ReactRun<'_>,
        mut emitter: Option<&mut EventEmitter>,
    ) -> Result<ReactOutcome, GatewayError> {
        let mut messages: Vec<Message> = run.history.to_vec();
        let mut model_used = String::from("unknown");
        let mut gateway_error: Option<GatewayError> = None;

        while state.current_step < state.max_steps {
            state.current_step += 1;

            let prompt = if state.current_step == 1 {
                run.initial_prompt.clone()
            } else {
                format!(
                    "Observation: {}\n\nContinue with your next thought or provide final answer.",
                    state.last_observation().unwrap_or_default()
                )
            };
            messages.push(Message::user(prompt));

            if let Some(em) = emitter.as_deref_mut() {
                let _ = em.status("reasoning").await;
            }

            // Images only accompany the first call; later turns are text.
            let images: &[ImageAttachment] = if state.current_step == 1 {
                run.images
            } else {
                &[]
            };

            let reply = match run
                .gateway
                .send(&messages, run.system_prompt, run.tier, true, images, run.cost)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(step = state.current_step, error = %e, "gateway failed during loop");
                    gateway_error = Some(e);
                    break;
                }
            };
            model_used = reply.model_name.clone();
            state.usage.add(reply.usage);
            messages.push(Message::assistant(reply.text.clone()));

            let parsed = parse_tool_call(&reply.text, &reply.tool_calls);

            if let Some((mut call, thought)) = parsed {
                debug!(tool = %call.tool_name, step = state.current_step, "executing tool call");
                if let Some(em) = emitter.as_deref_mut() {
                    let status = if call.tool_name == "vector_search" {
                        "searching"
                    } else {
                        "acting"
                    };
                    let _ = em.status(status).await;
                }

                let mut observation = self.executor.execute(&mut call, run.tool_counter).await;

                // vector_search returns {content, sources}; lift the sources
                // into the state and keep the content as the observation.
                if call.tool_name == "vector_search" {
                    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&observation) {
                        if let Some(content) = parsed.get("content").and_then(|c| c.as_str()) {
                            if let Some(sources) = parsed.get("sources") {
                                if let Ok(sources) =
                                    serde_json::from_value::<Vec<SourceRef>>(sources.clone())
                                {
                                    info!(count = sources.len(), "collected sources from retrieval");
                                    state.sources.extend(sources);
                                }
                            }
                            observation = content.to_string();
                        }
                    }
                }

                call.result = Some(observation.clone());
                let early_exit = call.tool_name == "vector_search"
                    && observation.len() > EARLY_EXIT_OBSERVATION_CHARS
                    && !observation.contains(NO_RELEVANT_DOCUMENTS);

                state.push_step(AgentStep {
                    step_number: state.current_step,
                    thought,
                    action: Some(call),
                    observation: Some(observation.clone()),
                    is_final: false,
                });
                state.context_gathered.push(observation);

                if early_exit {
                    info!("sufficient context from retrieval, exiting loop early");
                    break;
                }
            } else if let Some(idx) = reply.text.find(FINAL_ANSWER_MARKER) {
                let answer = reply.text[idx + FINAL_ANSWER_MARKER.len()..].trim().to_string();
                state.final_answer = Some(answer);
                state.push_step(AgentStep {
                    step_number: state.current_step,
                    thought: reply.text,
                    action: None,
                    observation: None,
                    is_final: true,
                });
                break;
            } else if state.current_step >= state.max_steps {
                // Out of steps: treat the last text as the answer.
                state.final_answer = Some(reply.text.clone());
                state.push_step(AgentStep {
                    step_number: state.current_step,
                    thought: reply.text,
                    action: None,
                    observation: None,
                    is_final: true,
                });
            } else {
                state.push_step(AgentStep {
                    step_number: state.current_step,
                    thought: reply.text,
                    action: None,
                    observation: None,
                    is_final: false,
                });
            }
        }

        // Synthesis fallback: loop ended without an answer but with context.
        if state.final_answer.is_none() && !state.context_gathered.is_empty() {
            if let Some(em) = emitter.as_deref_mut() {
                let _ = em.status("synthesizing").await;
            }
            let context = state.context_gathered.join("\n\n");
            let synthesis_prompt = format!(
                "Based on the information gathered:\n{context}\n\nProvide a final, comprehensive \
                 answer to: {}",
                state.query
            );
            match run
                .gateway
                .send(
                    &[Message::user(synthesis_prompt)],
                    run.system_prompt,
                    run.tier,
                    false,
                    &[],
                    run.cost,
                )
                .await
            {
                Ok(reply) => {
                    model_used = reply.model_name.clone();
                    state.usage.add(reply.usage);
                    state.final_answer = Some(reply.text);
                }
                Err(e) => {
                    warn!(error = %e, "final answer synthesis failed");
                    state.final_answer = Some(
                        "I apologize, but I couldn't generate a final answer based on the \
                         gathered information."
                            .to_string(),
                    );
                }
            }
        }

        let Some(answer) = state.final_answer.clone() else {
            // Nothing gathered and no answer: surface the gateway failure.
            return Err(gateway_error
                .unwrap_or(GatewayError::AllModelsFailed { warnings: vec![] }));
        };

        // Stub filtering: replace empty-gesture answers with a real fallback.
        let answer = if is_stub_response(&answer) {
            warn!("stub response detected, using fallback message");
            fallback_message(&state.query).to_string()
        } else {
            answer
        };

        if let Some(em) = emitter.as_deref_mut() {
            let _ = em.status("verifying").await;
        }

        // Response pipeline, with at most one self-correction pass.
        let mut outcome = self
            .pipeline
            .process(PipelineInput {
                response: answer,
                query: state.query.clone(),
                context_chunks: state.context_gathered.clone(),
                sources: state.sources.clone(),
            })
            .await;
        let mut verification_status = outcome.verification_status.to_string();

        if outcome.verification.score < VERIFICATION_THRESHOLD && !state.context_gathered.is_empty()
        {
            warn!(
                score = outcome.verification.score,
                reasoning = %outcome.verification.reasoning,
                "draft rejected by verifier, attempting self-correction"
            );
            let correction_prompt = format!(
                "SYSTEM: Your previous answer was REJECTED by the fact-checker.\n\n\
                 REASON: {}\nMISSING/WRONG: {}\n\nTASK: Rewrite the answer to \"{}\" using ONLY \
                 the provided context. Do not invent information. If the context is insufficient, \
                 admit it.\n\nCONTEXT:\n{}",
                outcome.verification.reasoning,
                outcome.verification.missing_citations.join(", "),
                state.query,
                state.context_gathered.join("\n\n"),
            );
            match run
                .gateway
                .send(
                    &[Message::user(correction_prompt)],
                    run.system_prompt,
                    run.tier,
                    false,
                    &[],
                    run.cost,
                )
                .await
            {
                Ok(reply) => {
                    state.usage.add(reply.usage);
                    outcome = self
                        .pipeline
                        .process(PipelineInput {
                            response: reply.text,
                            query: state.query.clone(),
                            context_chunks: state.context_gathered.clone(),
                            sources: state.sources.clone(),
                        })
                        .await;
                    verification_status = "corrected".to_string();
                    info!(score = outcome.verification.score, "self-correction applied");
                }
                Err(e) => warn!(error = %e, "self-correction call failed, keeping draft"),
            }
        }

        state.final_answer = Some(outcome.response);
        state.sources = outcome.sources;
        state.verification_score = outcome.verification.score;
        state.evidence_score = if state.context_gathered.is_empty() {
            0.0
        } else {
            1.0
        };

        Ok(ReactOutcome {
            model_used,
            verification_status,
        })
    }
}

/// Domain-appropriate fallback when the model produced a stub, in the
/// query's language.
fn fallback_message(query: &str) -> &'static str {
    match lang::detect(query) {
        Lang::Italian => {
            "Mi dispiace, non ho capito bene la tua richiesta. Potresti riformularla? Posso \
             aiutarti con visti, aziende e leggi in Indonesia."
        }
        Lang::Indonesian => {
            "Maaf, aku kurang paham maksud pertanyaannya. Bisa diulang dengan kata lain? Aku bisa \
             bantu soal visa, perusahaan, dan hukum di Indonesia."
        }
        _ => {
            "I'm sorry, I didn't quite understand your request. Could you rephrase it? I can help \
             with visas, companies and legal matters in Indonesia."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::json;
    use crate::llm::{
        MockModel, ModelPrice, ModelResponse, ModelUsage, NativeToolCall, RegisteredModel,
    };
    use crate::pipeline::ResponsePipeline;
    use crate::retrieval::{
        default_collections, CollectionManager, Document, HashEmbedder, HybridRetriever,
        InMemoryVectorIndex,
    };
    use crate::tools::{Tool, ToolRegistry, VectorSearchTool};
    use std::time::Duration;

    const LONG_DOC: &str = "PT PMA minimum capital is ten billion IDR. The paid-up portion must \
        be at least two and a half billion IDR unless a sector regulation says otherwise. \
        Shareholders can be foreign individuals or corporations. The company must obtain an NIB \
        through OSS and register for tax with a NPWP. Certain sectors on the priority list allow \
        full foreign ownership while others cap it; always check the applicable KBLI entry before \
        incorporating. Minimum investment plans above the capital threshold are reviewed by BKPM.";

    async fn retriever() -> Arc<HybridRetriever> {
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
                    doc_id: "pma".into(),
                    title: Some("Company Law".into()),
                    text: LONG_DOC.into(),
                }],
            )
            .await
            .unwrap();
        Arc::new(HybridRetriever::new(manager))
    }

    fn engine(tools: Vec<Arc<dyn Tool>>) -> ReasoningEngine {
        ReasoningEngine::new(
            Arc::new(ToolExecutor::new(
                Arc::new(ToolRegistry::new(tools)),
                10,
                Duration::from_secs(30),
            )),
            Arc::new(ResponsePipeline::with_default_verifier()),
        )
    }

    fn gateway(model: MockModel) -> LlmGateway {
        LlmGateway::new(
            vec![RegisteredModel {
                tier: Tier::Flash,
                client: Arc::new(model),
                price: ModelPrice::free(),
            }],
            &EngineConfig::default(),
        )
    }

    fn usage() -> ModelUsage {
        ModelUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
        }
    }

    #[tokio::test]
    async fn tool_call_then_early_exit_then_synthesis() {
        let retriever = retriever().await;
        let engine = engine(vec![Arc::new(VectorSearchTool::new(retriever))]);

        // First call requests retrieval; the long observation triggers the
        // early exit, so the second call is the tool-less synthesis.
        let model = MockModel::named("flash")
            .then_ok(ModelResponse {
                text: "I should search the knowledge base.".into(),
                tool_calls: vec![NativeToolCall {
                    name: "vector_search".into(),
                    arguments: json!({"query": "PT PMA minimum capital"}),
                }],
                usage: usage(),
            })
            .always_ok(|| ModelResponse {
                text: "The PT PMA minimum capital is ten billion IDR with two and a half billion \
                       paid up."
                    .into(),
                tool_calls: vec![],
                usage: usage(),
            });
        let gw = gateway(model);

        let mut state = AgentState::new("PT PMA minimum capital?", "business_complex", 6);
        let counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        let outcome = engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &gw,
                    initial_prompt: "PT PMA minimum capital?".into(),
                    system_prompt: "",
                    history: &[],
                    tier: Tier::Flash,
                    tool_counter: &counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.model_used, "flash");
        assert_eq!(state.steps.len(), 1);
        assert!(!state.sources.is_empty());
        let answer = state.final_answer.as_deref().unwrap();
        assert!(answer.contains("ten billion"));
        assert!(state.verification_score > 0.0);
        assert!(state.usage.total_tokens > 0);
    }

    #[tokio::test]
    async fn final_answer_marker_terminates_loop() {
        let engine = engine(vec![]);
        let gw = gateway(MockModel::with_text(
            "flash",
            "Final Answer: A KITAS is a limited stay permit.",
        ));
        let mut state = AgentState::new("what is a KITAS?", "simple", 6);
        let counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        let outcome = engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &gw,
                    initial_prompt: "what is a KITAS?".into(),
                    system_prompt: "",
                    history: &[],
                    tier: Tier::Flash,
                    tool_counter: &counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(state.steps.len(), 1);
        assert!(state.steps[0].is_final);
        assert!(state
            .final_answer
            .as_deref()
            .unwrap()
            .contains("limited stay permit"));
        // No retrieval: unchecked.
        assert_eq!(outcome.verification_status, "unchecked");
    }

    #[tokio::test]
    async fn thought_only_steps_consume_the_budget() {
        let engine = engine(vec![]);
        let gw = gateway(MockModel::with_text("flash", "Still thinking about it."));
        let mut state = AgentState::new("anything", "simple", 3);
        let counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &gw,
                    initial_prompt: "anything".into(),
                    system_prompt: "",
                    history: &[],
                    tier: Tier::Flash,
                    tool_counter: &counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(state.current_step, 3);
        // Out of steps: the last text becomes the answer.
        assert!(state.final_answer.is_some());
    }

    #[tokio::test]
    async fn stub_answer_replaced_with_fallback() {
        let engine = engine(vec![]);
        let gw = gateway(MockModel::with_text(
            "flash",
            "Final Answer: No further action needed.",
        ));
        let mut state = AgentState::new("Quanto costa il visto?", "simple", 6);
        let counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &gw,
                    initial_prompt: "Quanto costa il visto?".into(),
                    system_prompt: "",
                    history: &[],
                    tier: Tier::Flash,
                    tool_counter: &counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await
            .unwrap();
        let answer = state.final_answer.as_deref().unwrap();
        assert!(answer.starts_with("Mi dispiace"));
    }

    #[tokio::test]
    async fn gateway_failure_with_no_context_surfaces_error() {
        let engine = engine(vec![]);
        let gw = gateway(
            MockModel::named("flash")
                .always_err(|| crate::llm::ModelError::ServiceUnavailable("503".into())),
        );
        let mut state = AgentState::new("anything", "simple", 6);
        let counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        let err = engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &gw,
                    initial_prompt: "anything".into(),
                    system_prompt: "",
                    history: &[],
                    tier: Tier::Flash,
                    tool_counter: &counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllModelsFailed { .. }));
    }

    #[tokio::test]
    async fn inline_action_format_is_parsed() {
        let retriever = retriever().await;
        let engine = engine(vec![Arc::new(VectorSearchTool::new(retriever))]);
        let model = MockModel::named("flash")
            .then_ok(ModelResponse {
                text: "I need the law.\nAction: vector_search\nAction Input: {\"query\": \"PT PMA minimum capital\"}"
                    .into(),
                tool_calls: vec![],
                usage: usage(),
            })
            .always_ok(|| ModelResponse {
                text: "The PT PMA minimum capital is ten billion IDR.".into(),
                tool_calls: vec![],
                usage: usage(),
            });
        let gw = gateway(model);
        let mut state = AgentState::new("PT PMA capital?", "business_complex", 6);
        let counter = AtomicU32::new(0);
        let mut cost = CostTracker::default();
        engine
            .execute_react_loop(
                &mut state,
                ReactRun {
                    gateway: &gw,
                    initial_prompt: "PT PMA capital?".into(),
                    system_prompt: "",
                    history: &[],
                    tier: Tier::Flash,
                    tool_counter: &counter,
                    images: &[],
                    cost: &mut cost,
                },
                None,
            )
            .await
            .unwrap();
        let step = &state.steps[0];
        assert_eq!(step.action.as_ref().unwrap().tool_name, "vector_search");
        assert_eq!(step.thought, "I need the law.");
    }
}
