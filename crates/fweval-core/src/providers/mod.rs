//! Model provider abstraction.
//!
//! Backends and the judge only see [`LanguageModel`]; the HTTP clients for
//! each provider live in the submodules.

pub mod anthropic;
pub mod catalog;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HarnessConfig;
use crate::domain::{Provider, ProviderError};

pub use anthropic::AnthropicClient;
pub use catalog::{find_model, models, CatalogModel};
pub use openai::OpenAiCompatClient;

/// Output token ceiling for every generation call.
pub const MAX_OUTPUT_TOKENS: u32 = 16_384;

/// A tool the model may call, as advertised to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One turn of an agentic conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }
}

/// Result of one model round in a tool-calling loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelStep {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
}

/// A callable model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider(&self) -> Provider;

    fn model_id(&self) -> &str;

    /// Single non-interactive generation.
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError>;

    /// One round of a tool-calling conversation.
    async fn step(
        &self,
        system: &str,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelStep, ProviderError>;
}

/// Hands out [`LanguageModel`]s for one provider.
pub trait ProviderClient: Send + Sync {
    fn supports(&self, _model: &str) -> bool {
        true
    }

    fn model(&self, model: &str) -> Arc<dyn LanguageModel>;
}

/// Resolves (provider, model) pairs to callable models.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
    missing_keys: HashMap<Provider, &'static str>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Provider, client: Arc<dyn ProviderClient>) {
        self.missing_keys.remove(&provider);
        self.clients.insert(provider, client);
    }

    /// Register an HTTP client for every provider whose API key is set.
    pub fn from_config(config: &HarnessConfig, http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            let creds = config.credentials(provider);
            let Some(api_key) = creds.api_key.clone() else {
                registry.missing_keys.insert(provider, creds.key_var);
                continue;
            };
            let client: Arc<dyn ProviderClient> = match provider {
                Provider::Anthropic => Arc::new(AnthropicClient::new(
                    http.clone(),
                    api_key,
                    creds.base_url.clone(),
                )),
                _ => Arc::new(OpenAiCompatClient::new(
                    provider,
                    http.clone(),
                    api_key,
                    creds.base_url.clone(),
                )),
            };
            registry.register(provider, client);
        }
        registry
    }

    pub fn resolve(
        &self,
        provider: Provider,
        model: &str,
    ) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        match self.clients.get(&provider) {
            Some(client) if client.supports(model) => Ok(client.model(model)),
            Some(_) => Err(ProviderError::Unsupported {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
            None => match self.missing_keys.get(&provider) {
                Some(var) => Err(ProviderError::MissingApiKey {
                    provider: provider.to_string(),
                    var: var.to_string(),
                }),
                None => Err(ProviderError::Unsupported {
                    provider: provider.to_string(),
                    model: model.to_string(),
                }),
            },
        }
    }
}

/// Build a non-2xx provider response into [`ProviderError::Api`].
pub(crate) async fn api_error(provider: Provider, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    ProviderError::Api {
        provider: provider.to_string(),
        status,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        fn model_id(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str, _system: Option<&str>) -> Result<String, ProviderError> {
            Ok(prompt.to_string())
        }

        async fn step(
            &self,
            _system: &str,
            _conversation: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelStep, ProviderError> {
            Ok(ModelStep::default())
        }
    }

    struct OnlyEcho;

    impl ProviderClient for OnlyEcho {
        fn supports(&self, model: &str) -> bool {
            model == "echo"
        }

        fn model(&self, _model: &str) -> Arc<dyn LanguageModel> {
            Arc::new(Echo)
        }
    }

    #[test]
    fn unregistered_provider_is_unsupported() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve(Provider::Google, "gemini-2.5-flash").err().unwrap();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
    }

    #[test]
    fn client_can_reject_models() {
        let mut registry = ProviderRegistry::new();
        registry.register(Provider::OpenAi, Arc::new(OnlyEcho));
        assert!(registry.resolve(Provider::OpenAi, "echo").is_ok());
        assert!(matches!(
            registry.resolve(Provider::OpenAi, "gpt-5").err().unwrap(),
            ProviderError::Unsupported { .. }
        ));
    }

    #[test]
    fn missing_key_is_reported_by_variable() {
        let config = HarnessConfig::default();
        let registry = ProviderRegistry::from_config(&config, reqwest::Client::new());
        let err = registry.resolve(Provider::Anthropic, "claude-sonnet-4-5").err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
