//! Execution backends: turn a [`Task`] plus its prompt into response text.
//!
//! - [`DirectBackend`]: one completion call.
//! - [`McpBackend`]: agentic loop over tools discovered from an MCP server.
//! - [`AgentBackend`]: a CLI coding agent run as a subprocess.

pub mod agent;
pub mod direct;
pub mod mcp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExecError, ExecutionMode, Target, Task};
use crate::providers::ToolCall;

pub use agent::{resolve_agent, write_mcp_config, AgentBackend, AGENT_WORK_DIR};
pub use direct::DirectBackend;
pub use mcp::{McpBackend, DEFAULT_MAX_TOOL_ROUNDS};

/// System instruction for direct and MCP generations.
pub const SYSTEM_PROMPT: &str =
    "\nYOU MUST output all files as fenced code blocks, like so\n\n```lang file=\"path/to/file.ts\"\n\n```\n";

/// Instruction prepended to every agent prompt.
pub const AGENT_SYSTEM_INSTRUCTION: &str = "\nYOU MUST output all files as fenced code blocks, like so\n\n```lang file=\"path/to/file.ts\"\n// file content\n```\n\nDo not ask clarifying questions. Complete the task with the information provided.\n";

pub fn build_agent_prompt(prompt: &str) -> String {
    format!("{}\n\n---\n\n{}", AGENT_SYSTEM_INSTRUCTION.trim(), prompt)
}

/// One tool invocation's outcome inside an MCP step.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub tool_name: String,
    pub text: String,
    pub is_error: bool,
}

/// One model round of the MCP loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepRecord {
    pub text: String,
    pub finish_reason: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResultRecord>,
}

/// Facts about one agent subprocess run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub agent_label: String,
    pub prompt: String,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// Backend-specific record of how a response was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Trace {
    Mcp { steps: Vec<StepRecord> },
    Agent(AgentRun),
}

/// Raw output of a backend, before grading.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub response: String,
    pub trace: Option<Trace>,
}

impl Generation {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            trace: None,
        }
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `prompt` is the evaluation's PROMPT.md content.
    async fn execute(&self, task: &Task, prompt: &str) -> Result<Generation, ExecError>;
}

/// The backends available to one dispatch cycle.
#[derive(Clone, Default)]
pub struct BackendSet {
    direct: Option<Arc<dyn ExecutionBackend>>,
    mcp: Option<Arc<dyn ExecutionBackend>>,
    agent: Option<Arc<dyn ExecutionBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_direct(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.direct = Some(backend);
        self
    }

    pub fn with_mcp(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.mcp = Some(backend);
        self
    }

    pub fn with_agent(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.agent = Some(backend);
        self
    }

    /// Model targets pick by mode; agents handle both modes themselves.
    pub fn select(&self, task: &Task) -> Result<&Arc<dyn ExecutionBackend>, ExecError> {
        let slot = match (&task.target, task.flags.mode) {
            (Target::Model(_), ExecutionMode::Direct) => &self.direct,
            (Target::Model(_), ExecutionMode::Mcp) => &self.mcp,
            (Target::Agent(_), _) => &self.agent,
        };
        slot.as_ref()
            .ok_or_else(|| ExecError::NoBackend(task.target.id().to_string()))
    }
}

pub(crate) fn unsupported(backend: &str, target: &Target) -> ExecError {
    ExecError::UnsupportedTarget {
        backend: backend.to_string(),
        target: target.id().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_prompt_puts_instruction_before_separator() {
        let prompt = build_agent_prompt("Add auth middleware.\n");
        assert!(prompt.starts_with("YOU MUST output all files"));
        assert!(prompt.contains("Complete the task with the information provided.\n\n---\n\nAdd auth"));
        assert!(prompt.ends_with("middleware.\n"));
    }

    #[test]
    fn system_prompt_shows_labelled_fence() {
        assert!(SYSTEM_PROMPT.contains("```lang file=\"path/to/file.ts\""));
    }
}
