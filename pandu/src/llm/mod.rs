//! LLM layer: the `ModelClient` abstraction, tier routing, circuit breakers
//! and the fallback gateway.
//!
//! The gateway is the single entry point for model calls. Callers pick a
//! [`Tier`]; the gateway resolves a fallback chain, skips models whose
//! breaker is open, enforces per-query cost/depth caps, and accounts tokens
//! against a per-model price table.

mod breaker;
mod gateway;
mod mock;
mod openai;
mod pricing;

pub use breaker::{BreakerState, CircuitBreaker};
pub use gateway::{CostTracker, GatewayReply, LlmGateway, RegisteredModel};
pub use mock::MockModel;
pub use openai::OpenAiModel;
pub use pricing::ModelPrice;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{ImageAttachment, Message};
use crate::tools::ToolSpec;

/// Model tier, cheapest-capable first in fallback order: Pro → Flash →
/// Fallback. Requesting a tier resolves a chain from that tier down to the
/// cheapest configured model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Pro,
    Flash,
    Fallback,
}

impl Tier {
    pub(crate) fn rank(self) -> u8 {
        match self {
            Tier::Pro => 0,
            Tier::Flash => 1,
            Tier::Fallback => 2,
        }
    }
}

/// One request to a concrete model.
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    pub system_prompt: &'a str,
    /// Tool schemas for native function calling; empty disables tools.
    pub tools: &'a [ToolSpec],
    /// Images for multimodal calls; each declares its MIME type explicitly.
    pub images: &'a [ImageAttachment],
}

/// A native function call returned by a model.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Raw token counts from a provider response.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Completion from a concrete model: text, native tool calls, usage.
#[derive(Debug, Default)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<NativeToolCall>,
    pub usage: ModelUsage,
}

/// Classified model failure. Quota and availability failures drive the
/// fallback cascade; the rest are still recorded on the breaker.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Short category tag for structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::QuotaExhausted(_) => "quota",
            Self::ServiceUnavailable(_) => "unavailable",
            Self::Transport(_) => "transport",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Gateway-level failure surfaced to the orchestrator.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every model in the fallback chain failed or was skipped.
    #[error("all models in fallback chain failed")]
    AllModelsFailed {
        /// Per-model failure notes, suitable for `CoreResult.warnings`.
        warnings: Vec<String>,
    },
    /// No model is registered for the requested tier or below.
    #[error("no models configured for tier {0:?}")]
    NoModels(Tier),
}

/// A concrete model client: one provider + model name.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Stable model name used for breaker keying, pricing and `model_used`.
    fn name(&self) -> &str;

    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError>;
}
