//! OpenAI-compatible chat completions client.
//!
//! Serves OpenAI itself plus the OpenAI-compatible endpoints of Google and
//! Vercel (v0).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    api_error, ChatMessage, LanguageModel, ModelStep, ProviderClient, ToolCall, ToolSpec,
    MAX_OUTPUT_TOKENS,
};
use crate::domain::{Provider, ProviderError};

pub fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
        Provider::Vercel => "https://api.v0.dev/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Client for one OpenAI-compatible provider.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    provider: Provider,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(
        provider: Provider,
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            provider,
            http,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| default_base_url(provider).to_string()),
        }
    }
}

impl ProviderClient for OpenAiCompatClient {
    fn supports(&self, model: &str) -> bool {
        match self.provider {
            Provider::Vercel => model.starts_with("v0-"),
            _ => true,
        }
    }

    fn model(&self, model: &str) -> Arc<dyn LanguageModel> {
        Arc::new(OpenAiCompatModel {
            client: self.clone(),
            model: model.to_string(),
        })
    }
}

/// One model behind an [`OpenAiCompatClient`].
pub struct OpenAiCompatModel {
    client: OpenAiCompatClient,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object.
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn text_message(role: &str, content: &str) -> WireMessage {
    WireMessage {
        role: role.to_string(),
        content: Some(content.to_string()),
        tool_calls: None,
        tool_call_id: None,
    }
}

fn convert_conversation(system: &str, conversation: &[ChatMessage]) -> Vec<WireMessage> {
    let mut out = vec![text_message("system", system)];
    for message in conversation {
        out.push(match message {
            ChatMessage::User { content } => text_message("user", content),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => WireMessage {
                role: "assistant".to_string(),
                content: (!content.is_empty()).then(|| content.clone()),
                tool_calls: (!tool_calls.is_empty()).then(|| {
                    tool_calls
                        .iter()
                        .map(|c| WireToolCall {
                            id: c.id.clone(),
                            call_type: function_type(),
                            function: WireFunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.to_string(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: None,
            },
            ChatMessage::Tool {
                call_id, content, ..
            } => WireMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            },
        });
    }
    out
}

fn convert_tools(tools: &[ToolSpec]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            tool_type: "function",
            function: WireFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

fn parse_step(response: ChatResponse) -> Result<ModelStep, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| {
            let arguments = if c.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&c.function.arguments)
                    .map_err(|e| ProviderError::Decode(format!("tool arguments: {e}")))?
            };
            Ok(ToolCall {
                id: c.id,
                name: c.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    Ok(ModelStep {
        text: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
    })
}

impl OpenAiCompatModel {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.client.base_url);
        debug!(provider = %self.client.provider, model = %self.model, "chat completion request");

        let response = self
            .client
            .http
            .post(&url)
            .bearer_auth(&self.client.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(self.client.provider, response).await);
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    fn request(&self, messages: Vec<WireMessage>, tools: Vec<WireTool>) -> ChatRequest {
        // OpenAI's reasoning models reject `max_tokens`.
        let (max_tokens, max_completion_tokens) = match self.client.provider {
            Provider::OpenAi => (None, Some(MAX_OUTPUT_TOKENS)),
            _ => (Some(MAX_OUTPUT_TOKENS), None),
        };
        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens,
            max_completion_tokens,
            tools,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    fn provider(&self) -> Provider {
        self.client.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(text_message("system", system));
        }
        messages.push(text_message("user", prompt));

        let response = self.send(&self.request(messages, Vec::new())).await?;
        Ok(parse_step(response)?.text)
    }

    async fn step(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelStep, ProviderError> {
        let request = self.request(
            convert_conversation(system, conversation),
            convert_tools(tools),
        );
        let response = self.send(&request).await?;
        parse_step(response)
    }
}
