//! Error taxonomy for fweval.
//!
//! - [`ConfigError`]: fatal, raised before any task runs.
//! - [`ExecError`] and its sources: isolated to one task, flattened into a
//!   [`TaskFailure`] before crossing the task boundary.

use serde::{Deserialize, Serialize};

/// Fatal configuration errors. The CLI maps these to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No evaluation matching \"{filter}\". Available: {}", .available.join(", "))]
    NoMatchingEvaluation {
        filter: String,
        available: Vec<String>,
    },

    #[error("No model matching \"{filter}\". Available: {}", .available.join(", "))]
    NoMatchingModel {
        filter: String,
        available: Vec<String>,
    },

    #[error("Missing --agent. Available: {}", .available.join(", "))]
    MissingAgent { available: Vec<String> },

    #[error("Unknown agent \"{agent}\". Available: {}", .available.join(", "))]
    UnknownAgent {
        agent: String,
        available: Vec<String>,
    },

    #[error("could not resolve executable `{command}`: {reason}")]
    ExecutableNotFound { command: String, reason: String },

    #[error("grader `{name}` is invalid: {reason}")]
    InvalidGrader { name: String, reason: String },

    #[error("duplicate grader name `{name}`")]
    DuplicateGrader { name: String },

    #[error("grader set must contain at least one grader")]
    EmptyGraderSet,

    #[error("unknown shared judge `{name}`")]
    UnknownJudge { name: String },

    #[error("invalid evaluation at {path}: {reason}")]
    Catalog { path: String, reason: String },
}

/// Errors from model provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unsupported provider/model pair: {provider}/{model}")]
    Unsupported { provider: String, model: String },

    #[error("{provider} API key not configured (set {var})")]
    MissingApiKey { provider: String, var: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API returned {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

/// Errors raised while running a grader.
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("judge call failed: {0}")]
    Judge(#[from] ProviderError),

    #[error("judge returned an unrecognised verdict: {0}")]
    Verdict(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("needle must not be empty")]
    EmptyNeedle,

    #[error("judge rubric must not be empty")]
    EmptyRubric,

    #[error("grader `{name}` failed: {source}")]
    Named {
        name: String,
        #[source]
        source: Box<GradeError>,
    },
}

/// Errors from the MCP tool session.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("mcp transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mcp server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("mcp protocol error: {0}")]
    Protocol(String),

    #[error("mcp error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("mcp session already closed")]
    Closed,
}

/// Everything that can fail a single task.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Grade(#[from] GradeError),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("agent exited with status {} and produced no output", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    NoOutput { exit_code: Option<i32> },

    #[error("failed to read prompt {path}: {source}")]
    Prompt {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} backend cannot execute {target}")]
    UnsupportedTarget { backend: String, target: String },

    #[error("no backend configured for {0}")]
    NoBackend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plain-data failure value returned by a task.
///
/// Carries no live error object, so it can be logged, persisted, or sent
/// across any isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    /// Flatten `err` and its `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            trace: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.message.starts_with("Timeout after")
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ExecError> for TaskFailure {
    fn from(err: ExecError) -> Self {
        TaskFailure::from_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_lists_alternatives() {
        let err = ConfigError::NoMatchingEvaluation {
            filter: "bogus".to_string(),
            available: vec!["evals/auth/routes".into(), "evals/billing/checkout-new".into()],
        };
        assert_eq!(
            err.to_string(),
            "No evaluation matching \"bogus\". Available: evals/auth/routes, evals/billing/checkout-new"
        );
    }

    #[test]
    fn timeout_failure_is_recognisable() {
        let failure = TaskFailure::from(ExecError::Timeout { ms: 250 });
        assert_eq!(failure.message, "Timeout after 250ms");
        assert!(failure.is_timeout());
    }

    #[test]
    fn named_grade_error_keeps_cause_in_trace() {
        let err = ExecError::Grade(GradeError::Named {
            name: "correct_auth_protect".into(),
            source: Box::new(GradeError::Verdict("maybe".into())),
        });
        let failure = TaskFailure::from(err);
        assert!(failure.message.contains("correct_auth_protect"));
        assert!(failure
            .trace
            .as_deref()
            .unwrap()
            .contains("unrecognised verdict"));
    }

    #[test]
    fn no_output_formats_exit_code() {
        let err = ExecError::NoOutput { exit_code: Some(2) };
        assert_eq!(err.to_string(), "agent exited with status 2 and produced no output");
    }
}
