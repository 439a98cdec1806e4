//! Context window management: trim long conversation histories and
//! summarize what was cut so older turns stay visible to the model.

use tracing::{info, warn};

use crate::llm::{CostTracker, LlmGateway, Tier};
use crate::message::Message;

/// Split of a long history into what to keep and what to summarize.
#[derive(Clone, Debug)]
pub struct TrimResult {
    pub needs_summarization: bool,
    pub messages_to_summarize: Vec<Message>,
    pub trimmed_messages: Vec<Message>,
}

pub struct ContextWindowManager {
    keep_messages: usize,
    summarize_threshold: usize,
}

impl ContextWindowManager {
    pub fn new(keep_messages: usize, summarize_threshold: usize) -> Self {
        Self {
            keep_messages,
            summarize_threshold,
        }
    }

    /// Keeps the last `keep_messages`; flags summarization when the history
    /// exceeds the threshold.
    pub fn trim_conversation_history(&self, history: &[Message]) -> TrimResult {
        if history.len() <= self.keep_messages {
            return TrimResult {
                needs_summarization: false,
                messages_to_summarize: Vec::new(),
                trimmed_messages: history.to_vec(),
            };
        }
        let split = history.len() - self.keep_messages;
        TrimResult {
            needs_summarization: history.len() > self.summarize_threshold,
            messages_to_summarize: history[..split].to_vec(),
            trimmed_messages: history[split..].to_vec(),
        }
    }

    /// Summarizes the cut messages with a tool-less model call.
    pub async fn generate_summary(
        &self,
        gateway: &LlmGateway,
        messages: &[Message],
    ) -> Result<String, crate::llm::GatewayError> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role().to_uppercase(), m.content()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Summarize this earlier part of a business-advisory conversation in at most 5 \
             sentences. Keep names, goals, amounts and decisions.\n\n{transcript}"
        );
        let mut cost = CostTracker::default();
        let reply = gateway
            .send(&[Message::user(prompt)], "", Tier::Flash, false, &[], &mut cost)
            .await?;
        Ok(reply.text)
    }

    /// Prepends the summary as a synthetic system message.
    pub fn inject_summary_into_history(
        &self,
        trimmed: Vec<Message>,
        summary: String,
    ) -> Vec<Message> {
        let mut out = Vec::with_capacity(trimmed.len() + 1);
        out.push(Message::system(format!(
            "Summary of the earlier conversation: {summary}"
        )));
        out.extend(trimmed);
        out
    }

    /// Full pipeline: trim, summarize when needed, degrade to the raw trim
    /// when summarization fails.
    pub async fn prepare_history(
        &self,
        gateway: &LlmGateway,
        history: &[Message],
    ) -> Vec<Message> {
        let trim = self.trim_conversation_history(history);
        if !trim.needs_summarization {
            return trim.trimmed_messages;
        }
        info!(
            to_summarize = trim.messages_to_summarize.len(),
            "summarizing older conversation messages"
        );
        match self.generate_summary(gateway, &trim.messages_to_summarize).await {
            Ok(summary) => self.inject_summary_into_history(trim.trimmed_messages, summary),
            Err(e) => {
                warn!(error = %e, "summarization failed, using trimmed history");
                trim.trimmed_messages
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::llm::{MockModel, ModelError, ModelPrice, ModelResponse, RegisteredModel};
    use std::sync::Arc;

    fn history(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("m{i}"))).collect()
    }

    fn manager() -> ContextWindowManager {
        ContextWindowManager::new(20, 30)
    }

    fn gateway_with(model: MockModel) -> LlmGateway {
        LlmGateway::new(
            vec![RegisteredModel {
                tier: Tier::Flash,
                client: Arc::new(model),
                price: ModelPrice::free(),
            }],
            &EngineConfig::default(),
        )
    }

    #[test]
    fn short_history_is_untouched() {
        let trim = manager().trim_conversation_history(&history(10));
        assert!(!trim.needs_summarization);
        assert_eq!(trim.trimmed_messages.len(), 10);
        assert!(trim.messages_to_summarize.is_empty());
    }

    #[test]
    fn between_keep_and_threshold_trims_without_summary() {
        let trim = manager().trim_conversation_history(&history(25));
        assert!(!trim.needs_summarization);
        assert_eq!(trim.trimmed_messages.len(), 20);
        assert_eq!(trim.messages_to_summarize.len(), 5);
    }

    #[test]
    fn beyond_threshold_needs_summarization() {
        let trim = manager().trim_conversation_history(&history(35));
        assert!(trim.needs_summarization);
        assert_eq!(trim.trimmed_messages.len(), 20);
        assert_eq!(trim.messages_to_summarize.len(), 15);
    }

    #[tokio::test]
    async fn prepare_history_injects_system_summary() {
        let gateway = gateway_with(MockModel::with_text("flash", "They discussed a PT PMA."));
        let out = manager().prepare_history(&gateway, &history(35)).await;
        assert_eq!(out.len(), 21);
        assert_eq!(out[0].role(), "system");
        assert!(out[0].content().contains("PT PMA"));
    }

    #[tokio::test]
    async fn summarizer_failure_degrades_to_trim() {
        let gateway = gateway_with(
            MockModel::named("flash").always_err(|| ModelError::ServiceUnavailable("503".into())),
        );
        let out = manager().prepare_history(&gateway, &history(35)).await;
        assert_eq!(out.len(), 20);
        assert_eq!(out[0].role(), "user");
    }
}
