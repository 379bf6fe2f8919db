use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{
    unsupported, ExecutionBackend, Generation, StepRecord, ToolResultRecord, Trace, SYSTEM_PROMPT,
};
use crate::domain::{ExecError, Provider, Target, Task};
use crate::mcp::{SessionConnector, SessionGuard, ToolSession};
use crate::providers::{ChatMessage, LanguageModel, ProviderRegistry, ToolSpec};
use crate::rate_limiter::RateLimiter;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Tool-augmented generation against an MCP server.
///
/// The model alternates between text and tool calls until it stops asking
/// for tools or `max_tool_rounds` model steps have run. The text of every
/// step is kept: the deliverable often lands in an intermediate step.
pub struct McpBackend {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
    connector: Arc<dyn SessionConnector>,
    server_url: String,
    max_tool_rounds: usize,
}

impl McpBackend {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiter: Arc<RateLimiter>,
        connector: Arc<dyn SessionConnector>,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            limiter,
            connector,
            server_url: server_url.into(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Hard ceiling on model steps; values below 1 are raised to 1.
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    async fn run_loop(
        &self,
        model: &dyn LanguageModel,
        provider: Provider,
        session: &dyn ToolSession,
        prompt: &str,
    ) -> Result<Vec<StepRecord>, ExecError> {
        let tools: Vec<ToolSpec> = session.tools().iter().map(ToolSpec::from).collect();
        debug!(tools = tools.len(), "starting tool loop");

        let mut conversation = vec![ChatMessage::user(prompt)];
        let mut steps = Vec::new();
        for round in 1..=self.max_tool_rounds {
            self.limiter.acquire(provider).await;
            let step = model.step(SYSTEM_PROMPT, &conversation, &tools).await?;
            let mut record = StepRecord {
                text: step.text.clone(),
                finish_reason: step.finish_reason.clone(),
                tool_calls: step.tool_calls.clone(),
                tool_results: Vec::new(),
            };
            if step.tool_calls.is_empty() {
                steps.push(record);
                break;
            }

            conversation.push(ChatMessage::Assistant {
                content: step.text,
                tool_calls: step.tool_calls.clone(),
            });
            for call in &step.tool_calls {
                // Tool failures go back to the model as text.
                let (text, is_error) = match session.call_tool(&call.name, call.arguments.clone()).await {
                    Ok(result) => (result.to_text(), result.is_error()),
                    Err(e) => (format!("Error: {e}"), true),
                };
                debug!(round, tool = %call.name, is_error, "tool call finished");
                conversation.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: text.clone(),
                });
                record.tool_results.push(ToolResultRecord {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    text,
                    is_error,
                });
            }
            steps.push(record);
        }
        Ok(steps)
    }
}

/// Non-empty step texts joined by blank lines.
pub fn combine_step_text(steps: &[StepRecord]) -> String {
    steps
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ExecutionBackend for McpBackend {
    fn name(&self) -> &'static str {
        "mcp"
    }

    #[instrument(skip(self, task, prompt), fields(task_target = %task.target, evaluation = %task.evaluation.path))]
    async fn execute(&self, task: &Task, prompt: &str) -> Result<Generation, ExecError> {
        let Target::Model(target) = &task.target else {
            return Err(unsupported(self.name(), &task.target));
        };
        let model = self.registry.resolve(target.provider, &target.model)?;

        let guard = SessionGuard::new(self.connector.connect(&self.server_url).await?);
        let outcome = self
            .run_loop(model.as_ref(), target.provider, guard.session(), prompt)
            .await;
        guard.close().await;

        let steps = outcome?;
        Ok(Generation {
            response: combine_step_text(&steps),
            trace: Some(Trace::Mcp { steps }),
        })
    }
}
