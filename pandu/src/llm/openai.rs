//! OpenAI-compatible Chat Completions client implementing [`ModelClient`].
//!
//! Uses the real Chat Completions API via `async_openai`. Requires
//! `OPENAI_API_KEY` (or explicit config, e.g. a custom base URL for an
//! OpenAI-compatible provider). Tool schemas from the request enable native
//! tool calling; images are sent as data-URL content parts with their
//! declared MIME type.

use async_trait::async_trait;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, ChatCompletionTool,
        ChatCompletionToolChoiceOption, ChatCompletionTools, CreateChatCompletionRequestArgs,
        FunctionObject, ImageUrlArgs, ToolChoiceOptions,
    },
    Client,
};

use crate::message::{ImageAttachment, Message};

use super::{ModelClient, ModelError, ModelRequest, ModelResponse, ModelUsage, NativeToolCall};

/// Chat Completions client for one concrete model name.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiModel {
    /// Build client with default config (API key from `OPENAI_API_KEY` env).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: Some(0.4),
        }
    }

    /// Build client with custom config (e.g. custom API key or base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: Some(0.4),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn user_message_with_images(
        text: &str,
        images: &[ImageAttachment],
    ) -> Result<ChatCompletionRequestUserMessage, ModelError> {
        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        if !text.is_empty() {
            parts.push(
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(text)
                    .build()
                    .map_err(|e| ModelError::InvalidResponse(e.to_string()))?
                    .into(),
            );
        }
        for img in images {
            let (mime, data) = img.mime_and_data();
            let url = format!("data:{mime};base64,{data}");
            parts.push(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(url)
                            .build()
                            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| ModelError::InvalidResponse(e.to_string()))?
                    .into(),
            );
        }
        Ok(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Array(parts),
            ..Default::default()
        })
    }

    fn build_messages(
        request: &ModelRequest<'_>,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ModelError> {
        let mut out = Vec::with_capacity(request.messages.len() + 2);
        if !request.system_prompt.is_empty() {
            out.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage::from(request.system_prompt),
            ));
        }

        // Images attach to the last user message; everything else is text.
        let last_user_idx = request
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::User(_)));

        for (i, m) in request.messages.iter().enumerate() {
            let converted = match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => {
                    if Some(i) == last_user_idx && !request.images.is_empty() {
                        ChatCompletionRequestMessage::User(Self::user_message_with_images(
                            s,
                            request.images,
                        )?)
                    } else {
                        ChatCompletionRequestMessage::User(
                            ChatCompletionRequestUserMessage::from(s.as_str()),
                        )
                    }
                }
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            };
            out.push(converted);
        }
        Ok(out)
    }

    fn classify(error: OpenAIError) -> ModelError {
        match error {
            OpenAIError::ApiError(api) => {
                let code = api.code.clone().unwrap_or_default();
                let text = format!("{code} {}", api.message).to_lowercase();
                if text.contains("insufficient_quota")
                    || text.contains("rate_limit")
                    || text.contains("quota")
                {
                    ModelError::QuotaExhausted(api.message)
                } else if text.contains("overloaded")
                    || text.contains("unavailable")
                    || text.contains("server_error")
                {
                    ModelError::ServiceUnavailable(api.message)
                } else {
                    ModelError::Transport(api.message)
                }
            }
            OpenAIError::Reqwest(e) => ModelError::Transport(e.to_string()),
            OpenAIError::JSONDeserialize(e, _) => ModelError::InvalidResponse(e.to_string()),
            other => ModelError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let messages = Self::build_messages(&request)?;
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(messages);

        if !request.tools.is_empty() {
            let chat_tools: Vec<ChatCompletionTools> = request
                .tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.input_schema.clone()),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(chat_tools);
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }

        if let Some(t) = self.temperature {
            args.temperature(t);
        }

        let request_body = args
            .build()
            .map_err(|e| ModelError::InvalidResponse(format!("request build failed: {e}")))?;

        debug!(
            model = %self.model,
            message_count = request.messages.len(),
            tools_count = request.tools.len(),
            image_count = request.images.len(),
            "chat completion create"
        );
        if let Ok(js) = serde_json::to_string(&request_body) {
            trace!(model = %self.model, request = %js, "chat request body");
        }

        let response = self
            .client
            .chat()
            .create(request_body)
            .await
            .map_err(Self::classify)?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| ModelUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices returned".to_string()))?;

        let msg = choice.message;
        let text = msg.content.unwrap_or_default();
        let tool_calls: Vec<NativeToolCall> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                if let ChatCompletionMessageToolCalls::Function(f) = tc {
                    let arguments = serde_json::from_str(&f.function.arguments)
                        .unwrap_or(serde_json::Value::String(f.function.arguments));
                    Some(NativeToolCall {
                        name: f.function.name,
                        arguments,
                    })
                } else {
                    None
                }
            })
            .collect();

        Ok(ModelResponse {
            text,
            tool_calls,
            usage,
        })
    }
}
