//! Scripted model client for tests: replays a queue of responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ModelClient, ModelError, ModelRequest, ModelResponse, NativeToolCall};

type ResponseFactory = Box<dyn Fn() -> Result<ModelResponse, ModelError> + Send + Sync>;

/// Mock model: pops scripted responses in order, then falls back to a repeat
/// factory (if set) or an `InvalidResponse` error.
pub struct MockModel {
    name: String,
    scripted: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    repeat: Option<ResponseFactory>,
    calls: AtomicU32,
}

impl MockModel {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scripted: Mutex::new(VecDeque::new()),
            repeat: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Queues one successful response.
    pub fn then_ok(self, response: ModelResponse) -> Self {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
        self
    }

    /// Queues one failure.
    pub fn then_err(self, error: ModelError) -> Self {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// After the script is exhausted, keep returning this response.
    pub fn always_ok(
        mut self,
        factory: impl Fn() -> ModelResponse + Send + Sync + 'static,
    ) -> Self {
        self.repeat = Some(Box::new(move || Ok(factory())));
        self
    }

    /// After the script is exhausted, keep returning this error.
    pub fn always_err(mut self, factory: impl Fn() -> ModelError + Send + Sync + 'static) -> Self {
        self.repeat = Some(Box::new(move || Err(factory())));
        self
    }

    /// Convenience: a model that always answers with fixed text.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::named(name).always_ok(move || ModelResponse {
            text: text.clone(),
            ..Default::default()
        })
    }

    /// Convenience: a model that always requests one tool call.
    pub fn with_tool_call(
        name: impl Into<String>,
        tool: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        let tool = tool.into();
        Self::named(name).always_ok(move || ModelResponse {
            text: String::new(),
            tool_calls: vec![NativeToolCall {
                name: tool.clone(),
                arguments: arguments.clone(),
            }],
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(r) => r,
            None => match &self.repeat {
                Some(factory) => factory(),
                None => Err(ModelError::InvalidResponse("mock script exhausted".into())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_then_repeat() {
        let model = MockModel::named("m")
            .then_err(ModelError::QuotaExhausted("429".into()))
            .always_ok(|| ModelResponse {
                text: "later".into(),
                ..Default::default()
            });
        let req = || ModelRequest {
            messages: &[],
            system_prompt: "",
            tools: &[],
            images: &[],
        };
        assert!(model.complete(req()).await.is_err());
        assert_eq!(model.complete(req()).await.unwrap().text, "later");
        assert_eq!(model.call_count(), 2);
    }
}
