//! Units of dispatch and their outcomes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::TaskFailure;
use super::evaluation::Evaluation;
use super::target::Target;
use crate::graders::GraderSet;

/// Wall-clock budget for one generation (10 minutes).
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_millis(600_000);

/// How a model target generates its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Direct,
    /// Tool-augmented: MCP tools for API models, `.mcp.json` for agents.
    Mcp,
}

/// Per-run configuration shared by every task of a dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFlags {
    pub debug: bool,
    pub mode: ExecutionMode,
    pub timeout: Duration,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            debug: false,
            mode: ExecutionMode::Direct,
            timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

/// One (target, evaluation) pair. Consumed exactly once by a worker.
#[derive(Debug, Clone)]
pub struct Task {
    pub target: Target,
    pub evaluation: Arc<Evaluation>,
    pub graders: Arc<GraderSet>,
    pub flags: RunFlags,
}

impl Task {
    /// Label recorded with the score; tool-augmented runs get a ` (MCP)` suffix.
    pub fn label(&self) -> String {
        match self.flags.mode {
            ExecutionMode::Direct => self.target.label().to_string(),
            ExecutionMode::Mcp => format!("{} (MCP)", self.target.label()),
        }
    }

    /// File-name-safe identifier, unique per (evaluation, target) pair.
    pub fn artifact_stem(&self) -> String {
        format!("{}__{}", self.evaluation.slug(), self.target.id().replace('/', "_"))
    }
}

/// Whether one named grader passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraderOutcome {
    pub name: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallInfo {
    pub tool_name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultInfo {
    pub tool_name: String,
    pub result: serde_json::Value,
}

/// Write-once record of one task for manual inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugPayload {
    pub prompt: String,
    pub response: String,
    pub graders: Vec<GraderOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// A scored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSuccess {
    /// Always within `[0, 1]`.
    pub score: f64,
    pub graders: Vec<GraderOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugPayload>,
}

/// Outcome of executing one [`Task`].
pub type TaskResult = Result<TaskSuccess, TaskFailure>;
