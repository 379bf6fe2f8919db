//! Domain types for fweval.
//!
//! Everything that crosses the task boundary lives here as plain data.

pub mod error;
pub mod evaluation;
pub mod target;
pub mod task;

pub use error::{ConfigError, ExecError, GradeError, McpError, ProviderError, TaskFailure};
pub use evaluation::{Evaluation, DEFAULT_FRAMEWORK};
pub use target::{AgentKind, AgentTarget, ModelTarget, Provider, Target};
pub use task::{
    DebugPayload, ExecutionMode, GraderOutcome, RunFlags, Task, TaskResult, TaskSuccess,
    ToolCallInfo, ToolResultInfo, DEFAULT_TASK_TIMEOUT,
};
