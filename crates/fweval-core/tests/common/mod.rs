#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use fweval_core::domain::{McpError, ProviderError};
use fweval_core::mcp::{CallToolResult, McpTool, SessionConnector, ToolSession};
use fweval_core::providers::{
    ChatMessage, LanguageModel, ModelStep, ProviderClient, ProviderRegistry, ToolSpec,
};
use fweval_core::{Evaluation, Provider};

/// Model that answers `complete` with a fixed text and `step` from a script.
///
/// When the script runs dry the last step repeats.
pub struct ScriptedModel {
    provider: Provider,
    model: String,
    completion: Result<String, String>,
    steps: Mutex<VecDeque<ModelStep>>,
    last: Mutex<Option<ModelStep>>,
    pub step_calls: AtomicUsize,
    pub conversations: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn completing(provider: Provider, model: &str, text: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            completion: Ok(text.to_string()),
            steps: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            step_calls: AtomicUsize::new(0),
            conversations: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(provider: Provider, model: &str, message: &str) -> Self {
        Self {
            completion: Err(message.to_string()),
            ..Self::completing(provider, model, "")
        }
    }

    pub fn with_steps(self, steps: Vec<ModelStep>) -> Self {
        *self.steps.lock().unwrap() = steps.into();
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _prompt: &str, _system: Option<&str>) -> Result<String, ProviderError> {
        self.completion.clone().map_err(|body| ProviderError::Api {
            provider: self.provider.to_string(),
            status: 500,
            body,
        })
    }

    async fn step(
        &self,
        _system: &str,
        conversation: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelStep, ProviderError> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        self.conversations
            .lock()
            .unwrap()
            .push(conversation.to_vec());
        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                Ok(step)
            }
            None => Ok(last.clone().unwrap_or_default()),
        }
    }
}

/// Provider client handing out one shared model for every id.
pub struct FixedClient(pub Arc<ScriptedModel>);

impl ProviderClient for FixedClient {
    fn model(&self, _model: &str) -> Arc<dyn LanguageModel> {
        self.0.clone()
    }
}

pub fn registry_with(provider: Provider, model: Arc<ScriptedModel>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(provider, Arc::new(FixedClient(model)));
    registry
}

/// Tool session that echoes arguments back and counts calls and closes.
pub struct FakeSession {
    tools: Vec<McpTool>,
    pub fail_tool: Option<String>,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
}

impl FakeSession {
    pub fn new(tool_names: &[&str]) -> Self {
        Self {
            tools: tool_names
                .iter()
                .map(|name| McpTool {
                    name: name.to_string(),
                    description: Some(format!("{name} tool")),
                    input_schema: serde_json::json!({"type": "object"}),
                })
                .collect(),
            fail_tool: None,
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, tool: &str) -> Self {
        self.fail_tool = Some(tool.to_string());
        self
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tool.as_deref() == Some(name) {
            return Err(McpError::Rpc {
                code: -32000,
                message: "tool exploded".into(),
            });
        }
        Ok(CallToolResult::text(format!("{name} result for {arguments}")))
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector returning one prepared session, or failing.
pub struct FakeConnector {
    pub session: Option<Arc<FakeSession>>,
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn ToolSession>, McpError> {
        match &self.session {
            Some(session) => Ok(session.clone() as Arc<dyn ToolSession>),
            None => Err(McpError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }
}

/// Write `PROMPT.md` and `graders.toml` into `<root>/<relative>`.
pub fn write_eval(root: &Path, relative: &str, prompt: &str, graders: &str) -> std::path::PathBuf {
    let dir = root.join(relative);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("PROMPT.md"), prompt).unwrap();
    std::fs::write(dir.join("graders.toml"), graders).unwrap();
    dir
}

pub fn evaluation(root: &Path, relative: &str, category: &str) -> Evaluation {
    Evaluation::new(format!("evals/{relative}"), category, root.join(relative))
}

pub const X_AND_Y_GRADERS: &str = r#"
[[grader]]
name = "a"
kind = "contains"
needle = "X"

[[grader]]
name = "b"
kind = "contains"
needle = "Y"
"#;

/// Judge returning a fixed score, or failing when `score` is `None`.
pub struct StaticJudge {
    pub score: Option<f64>,
}

#[async_trait]
impl fweval_core::JudgeClient for StaticJudge {
    async fn score(
        &self,
        _rubric: &fweval_core::Rubric,
        _candidate: &str,
    ) -> Result<f64, fweval_core::domain::GradeError> {
        self.score.ok_or_else(|| {
            ProviderError::Api {
                provider: "openai".into(),
                status: 429,
                body: "rate limited".into(),
            }
            .into()
        })
    }
}

/// Build one catalog entry on disk and load its grader set.
pub fn entry(
    root: &Path,
    relative: &str,
    category: &str,
    graders: &str,
    judge: Option<f64>,
) -> fweval_core::CatalogEntry {
    write_eval(root, relative, "Build the feature.\n", graders);
    let judge: Arc<dyn fweval_core::JudgeClient> = Arc::new(StaticJudge { score: judge });
    let ctx = fweval_core::graders::GraderContext::new(judge);
    fweval_core::load_entries(vec![evaluation(root, relative, category)], &ctx)
        .unwrap()
        .remove(0)
}
