//! Anthropic messages API client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    api_error, ChatMessage, LanguageModel, ModelStep, ProviderClient, ToolCall, ToolSpec,
    MAX_OUTPUT_TOKENS,
};
use crate::domain::{Provider, ProviderError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

impl ProviderClient for AnthropicClient {
    fn supports(&self, model: &str) -> bool {
        model.starts_with("claude")
    }

    fn model(&self, model: &str) -> Arc<dyn LanguageModel> {
        Arc::new(AnthropicModel {
            client: self.clone(),
            model: model.to_string(),
        })
    }
}

pub struct AnthropicModel {
    client: AnthropicClient,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Value>,
}

#[derive(Serialize)]
struct WireTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// Map the neutral conversation onto Anthropic's user/assistant alternation.
/// Consecutive tool results are folded into one user turn.
fn convert_conversation(conversation: &[ChatMessage]) -> Vec<WireMessage> {
    let mut out: Vec<WireMessage> = Vec::new();
    for message in conversation {
        match message {
            ChatMessage::User { content } => out.push(WireMessage {
                role: "user",
                content: vec![json!({ "type": "text", "text": content })],
            }),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if !content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": content }));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                out.push(WireMessage {
                    role: "assistant",
                    content: blocks,
                });
            }
            ChatMessage::Tool {
                call_id, content, ..
            } => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                });
                match out.last_mut() {
                    Some(last) if last.role == "user" => last.content.push(block),
                    _ => out.push(WireMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }
    out
}

fn parse_step(response: MessagesResponse) -> ModelStep {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
            ContentBlock::Other => {}
        }
    }
    ModelStep {
        text: texts.join(""),
        tool_calls,
        finish_reason: response
            .stop_reason
            .unwrap_or_else(|| "end_turn".to_string()),
    }
}

impl AnthropicModel {
    async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, ProviderError> {
        let url = format!("{}/messages", self.client.base_url);
        debug!(model = %self.model, "anthropic messages request");

        let response = self
            .client
            .http
            .post(&url)
            .header("x-api-key", &self.client.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(Provider::Anthropic, response).await);
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_OUTPUT_TOKENS,
            system: system.map(str::to_string),
            messages: convert_conversation(&[ChatMessage::user(prompt)]),
            tools: Vec::new(),
        };
        Ok(parse_step(self.send(&request).await?).text)
    }

    async fn step(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelStep, ProviderError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_OUTPUT_TOKENS,
            system: Some(system.to_string()),
            messages: convert_conversation(conversation),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
        };
        Ok(parse_step(self.send(&request).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_tool_results_share_one_user_turn() {
        let conversation = vec![
            ChatMessage::user("go"),
            ChatMessage::Assistant {
                content: "looking".into(),
                tool_calls: vec![
                    ToolCall {
                        id: "a".into(),
                        name: "t".into(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        id: "b".into(),
                        name: "t".into(),
                        arguments: json!({}),
                    },
                ],
            },
            ChatMessage::Tool {
                call_id: "a".into(),
                name: "t".into(),
                content: "1".into(),
            },
            ChatMessage::Tool {
                call_id: "b".into(),
                name: "t".into(),
                content: "2".into(),
            },
        ];
        let wire = convert_conversation(&conversation);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[2].role, "user");
        assert_eq!(wire[2].content.len(), 2);
    }

    #[test]
    fn text_and_tool_use_blocks_are_split() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Let me check. " },
                { "type": "tool_use", "id": "tu_1", "name": "search_docs", "input": { "q": "x" } },
                { "type": "thinking", "thinking": "..." }
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        let step = parse_step(response);
        assert_eq!(step.text, "Let me check. ");
        assert_eq!(step.tool_calls.len(), 1);
        assert_eq!(step.finish_reason, "tool_use");
    }
}
