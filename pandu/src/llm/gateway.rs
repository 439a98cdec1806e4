//! The LLM gateway: tier routing, circuit breaking, fallback cascade,
//! cost/depth caps and token accounting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::message::{ImageAttachment, Message};
use crate::state::TokenUsage;
use crate::tools::ToolSpec;

use super::{
    BreakerState, CircuitBreaker, GatewayError, ModelClient, ModelError, ModelPrice, ModelRequest,
    NativeToolCall, Tier,
};

/// One model registered with the gateway: tier binding, client, price.
pub struct RegisteredModel {
    pub tier: Tier,
    pub client: Arc<dyn ModelClient>,
    pub price: ModelPrice,
}

/// Per-query cascade accounting, owned by the caller. `cost_usd`
/// accumulates across every call of the query; `depth` counts models
/// attempted within the current cascade and is reset on each `send`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CostTracker {
    pub cost_usd: f64,
    pub depth: u32,
}

/// Successful gateway reply.
#[derive(Debug)]
pub struct GatewayReply {
    pub text: String,
    pub model_name: String,
    pub tool_calls: Vec<NativeToolCall>,
    pub usage: TokenUsage,
}

/// Unified entry point for all model calls.
///
/// Models are registered in fallback order within each tier (cheapest last
/// overall); the fallback chain for a request is every model whose tier is
/// at or below the requested one, in registration order. Breaker state is
/// process-lifetime.
pub struct LlmGateway {
    models: Vec<RegisteredModel>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    tool_specs: RwLock<Vec<ToolSpec>>,
    breaker_threshold: u32,
    breaker_timeout: Duration,
    max_fallback_depth: u32,
    max_fallback_cost_usd: f64,
}

impl LlmGateway {
    pub fn new(models: Vec<RegisteredModel>, config: &EngineConfig) -> Self {
        Self {
            models,
            breakers: Mutex::new(HashMap::new()),
            tool_specs: RwLock::new(Vec::new()),
            breaker_threshold: config.circuit_breaker_threshold,
            breaker_timeout: Duration::from_secs(config.circuit_breaker_timeout_s),
            max_fallback_depth: config.max_fallback_depth,
            max_fallback_cost_usd: config.max_fallback_cost_usd,
        }
    }

    /// Registers the native function-calling schemas derived from the tool set.
    pub fn set_tool_specs(&self, specs: Vec<ToolSpec>) {
        let mut guard = self.tool_specs.write().unwrap_or_else(|e| e.into_inner());
        *guard = specs;
    }

    fn fallback_chain(&self, tier: Tier) -> Vec<&RegisteredModel> {
        self.models
            .iter()
            .filter(|m| m.tier.rank() >= tier.rank())
            .collect()
    }

    fn with_breaker<T>(&self, model: &str, f: impl FnOnce(&mut CircuitBreaker) -> T) -> T {
        let mut guard = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        let breaker = guard.entry(model.to_string()).or_insert_with(|| {
            CircuitBreaker::new(self.breaker_threshold, 2, self.breaker_timeout)
        });
        f(breaker)
    }

    /// Breaker state for one model, for diagnostics.
    pub fn breaker_state(&self, model: &str) -> BreakerState {
        self.with_breaker(model, |b| b.state())
    }

    /// Sends one turn through the fallback cascade.
    ///
    /// Routing per model in the chain: skip when the breaker is open; abort
    /// the cascade once the caller's accumulated cost or depth hits the cap;
    /// otherwise invoke, account usage into `cost`, and return. Classified
    /// failures are recorded on the breaker and the cascade continues.
    pub async fn send(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tier: Tier,
        enable_tools: bool,
        images: &[ImageAttachment],
        cost: &mut CostTracker,
    ) -> Result<GatewayReply, GatewayError> {
        let chain = self.fallback_chain(tier);
        if chain.is_empty() {
            return Err(GatewayError::NoModels(tier));
        }
        cost.depth = 0;

        let tool_specs = if enable_tools {
            self.tool_specs
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        } else {
            Vec::new()
        };

        let mut warnings = Vec::new();

        for model in chain {
            let name = model.client.name().to_string();

            if self.with_breaker(&name, |b| b.is_open()) {
                debug!(model = %name, "circuit breaker open, skipping");
                warnings.push(format!("{name}: circuit breaker open"));
                continue;
            }

            if cost.cost_usd >= self.max_fallback_cost_usd {
                warn!(cost = cost.cost_usd, "cost limit reached, stopping fallback cascade");
                warnings.push(format!("cost limit reached at ${:.4}", cost.cost_usd));
                break;
            }

            if cost.depth >= self.max_fallback_depth {
                warn!(depth = cost.depth, "max fallback depth reached, stopping cascade");
                warnings.push(format!("max fallback depth {} reached", cost.depth));
                break;
            }

            let request = ModelRequest {
                messages,
                system_prompt,
                tools: &tool_specs,
                images,
            };

            cost.depth += 1;
            match model.client.complete(request).await {
                Ok(response) => {
                    self.with_breaker(&name, |b| b.record_success());
                    let usage = model.price.usage(response.usage);
                    cost.cost_usd += usage.cost_usd;
                    debug!(model = %name, cost = usage.cost_usd, "gateway response received");
                    return Ok(GatewayReply {
                        text: response.text,
                        model_name: name,
                        tool_calls: response.tool_calls,
                        usage,
                    });
                }
                Err(e @ (ModelError::QuotaExhausted(_) | ModelError::ServiceUnavailable(_))) => {
                    self.with_breaker(&name, |b| b.record_failure());
                    warn!(model = %name, category = e.category(), error = %e, "model failed, falling back");
                    warnings.push(format!("{name}: {e}"));
                }
                Err(e) => {
                    self.with_breaker(&name, |b| b.record_failure());
                    warn!(model = %name, category = e.category(), error = %e, "model error, falling back");
                    warnings.push(format!("{name}: {e}"));
                }
            }
        }

        Err(GatewayError::AllModelsFailed { warnings })
    }

    /// Probes each configured model with a minimal payload.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let ping = [Message::user("ping")];
        let mut status = HashMap::new();
        for model in &self.models {
            let name = model.client.name().to_string();
            let ok = model
                .client
                .complete(ModelRequest {
                    messages: &ping,
                    system_prompt: "",
                    tools: &[],
                    images: &[],
                })
                .await
                .is_ok();
            if !ok {
                warn!(model = %name, "health check failed");
            }
            status.insert(name, ok);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModel, ModelResponse, ModelUsage};

    fn gateway(models: Vec<RegisteredModel>) -> LlmGateway {
        LlmGateway::new(models, &EngineConfig::default())
    }

    fn registered(tier: Tier, model: MockModel) -> RegisteredModel {
        RegisteredModel {
            tier,
            client: Arc::new(model),
            price: ModelPrice::new(0.001, 0.002),
        }
    }

    #[tokio::test]
    async fn quota_failure_falls_back_to_secondary() {
        let primary = MockModel::named("flash-primary")
            .then_err(ModelError::QuotaExhausted("429".into()));
        let secondary = MockModel::named("flash-fallback").then_ok(ModelResponse {
            text: "answer".into(),
            tool_calls: vec![],
            usage: ModelUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        });
        let gw = gateway(vec![
            registered(Tier::Flash, primary),
            registered(Tier::Fallback, secondary),
        ]);

        let mut cost = CostTracker::default();
        let reply = gw
            .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap();
        assert_eq!(reply.model_name, "flash-fallback");
        assert_eq!(cost.depth, 2);
        assert!(cost.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn all_models_failed_collects_warnings() {
        let a = MockModel::named("a").always_err(|| ModelError::ServiceUnavailable("503".into()));
        let b = MockModel::named("b").always_err(|| ModelError::Transport("reset".into()));
        let gw = gateway(vec![registered(Tier::Flash, a), registered(Tier::Fallback, b)]);

        let mut cost = CostTracker::default();
        let err = gw
            .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap_err();
        match err {
            GatewayError::AllModelsFailed { warnings } => {
                assert_eq!(warnings.len(), 2);
                assert!(warnings[0].contains("a:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_skips_model() {
        let flaky =
            MockModel::named("flaky").always_err(|| ModelError::ServiceUnavailable("503".into()));
        let stable = MockModel::named("stable").always_ok(|| ModelResponse {
            text: "ok".into(),
            ..Default::default()
        });
        let gw = gateway(vec![
            registered(Tier::Flash, flaky),
            registered(Tier::Fallback, stable),
        ]);

        for _ in 0..5 {
            let mut cost = CostTracker::default();
            let _ = gw
                .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
                .await;
        }
        assert_eq!(gw.breaker_state("flaky"), BreakerState::Open);

        // Next call should skip the open breaker and go straight to stable.
        let mut cost = CostTracker::default();
        let reply = gw
            .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap();
        assert_eq!(reply.model_name, "stable");
    }

    #[tokio::test]
    async fn depth_cap_limits_models_attempted_per_cascade() {
        let models: Vec<Arc<MockModel>> = (0..5)
            .map(|i| {
                Arc::new(
                    MockModel::named(format!("m{i}"))
                        .always_err(|| ModelError::ServiceUnavailable("503".into())),
                )
            })
            .collect();
        let registered: Vec<RegisteredModel> = models
            .iter()
            .map(|m| RegisteredModel {
                tier: Tier::Flash,
                client: Arc::clone(m) as Arc<dyn crate::llm::ModelClient>,
                price: ModelPrice::free(),
            })
            .collect();
        let gw = gateway(registered);

        let mut cost = CostTracker::default();
        let err = gw
            .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllModelsFailed { .. }));
        assert_eq!(cost.depth, 3);
        // Only the first three models in the chain were attempted.
        let attempts: Vec<u32> = models.iter().map(|m| m.call_count()).collect();
        assert_eq!(attempts, vec![1, 1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn depth_resets_between_sends() {
        let flaky = MockModel::named("flaky")
            .then_err(ModelError::QuotaExhausted("429".into()))
            .always_ok(|| ModelResponse::default());
        let stable = MockModel::named("stable").always_ok(|| ModelResponse::default());
        let gw = gateway(vec![
            registered(Tier::Flash, flaky),
            registered(Tier::Fallback, stable),
        ]);

        let mut cost = CostTracker::default();
        gw.send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap();
        assert_eq!(cost.depth, 2);

        // The next send starts a fresh cascade; cost keeps accumulating.
        let before = cost.cost_usd;
        gw.send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap();
        assert_eq!(cost.depth, 1);
        assert!(cost.cost_usd >= before);
    }

    #[tokio::test]
    async fn cost_cap_aborts_cascade() {
        let only = MockModel::named("only").always_ok(|| ModelResponse::default());
        let gw = gateway(vec![registered(Tier::Flash, only)]);

        let mut cost = CostTracker {
            cost_usd: 0.10,
            depth: 0,
        };
        let err = gw
            .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AllModelsFailed { .. }));
    }

    #[tokio::test]
    async fn pro_tier_chain_includes_lower_tiers() {
        let pro = MockModel::named("pro").then_err(ModelError::QuotaExhausted("429".into()));
        let flash = MockModel::named("flash").always_ok(|| ModelResponse {
            text: "from flash".into(),
            ..Default::default()
        });
        let gw = gateway(vec![registered(Tier::Pro, pro), registered(Tier::Flash, flash)]);

        let mut cost = CostTracker::default();
        let reply = gw
            .send(&[Message::user("q")], "", Tier::Pro, false, &[], &mut cost)
            .await
            .unwrap();
        assert_eq!(reply.model_name, "flash");

        // A Flash-tier request must not touch the Pro model.
        let mut cost = CostTracker::default();
        let reply = gw
            .send(&[Message::user("q")], "", Tier::Flash, false, &[], &mut cost)
            .await
            .unwrap();
        assert_eq!(reply.model_name, "flash");
    }

    #[tokio::test]
    async fn health_check_reports_per_model_availability() {
        let up = MockModel::named("up").always_ok(|| ModelResponse::default());
        let down = MockModel::named("down").always_err(|| ModelError::Transport("dns".into()));
        let gw = gateway(vec![registered(Tier::Flash, up), registered(Tier::Fallback, down)]);

        let status = gw.health_check().await;
        assert_eq!(status.get("up"), Some(&true));
        assert_eq!(status.get("down"), Some(&false));
    }
}
