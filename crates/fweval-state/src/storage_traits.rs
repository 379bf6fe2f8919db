//! Storage trait definitions for fweval
//!
//! `ResultStore` is the durable, append-only log behind every evaluation run:
//! - `results`: one row per successfully scored task
//! - `errors`: one row per failed task
//!
//! Implementations must tolerate concurrent single-row appends from many
//! tasks. In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Groups every record produced by one dispatcher invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Build a run id of the form `<prefix>-<timestamp>`, where the timestamp is
    /// RFC 3339 with `:` and `.` replaced so it is safe in file paths.
    pub fn new(prefix: &str) -> Self {
        Self::at(prefix, Utc::now())
    }

    /// Same as [`RunId::new`] with an explicit clock reading.
    pub fn at(prefix: &str, now: DateTime<Utc>) -> Self {
        let ts = now
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        RunId(format!("{prefix}-{ts}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single score for one target on one evaluation.
///
/// This is also the element type of the `scores*.json` artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub model: String,
    pub label: String,
    pub framework: String,
    pub category: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A persisted row from the `results` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub run_id: RunId,
    pub model: String,
    pub label: String,
    pub framework: String,
    pub category: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn new(run_id: &RunId, score: &Score) -> Self {
        Self {
            run_id: run_id.clone(),
            model: score.model.clone(),
            label: score.label.clone(),
            framework: score.framework.clone(),
            category: score.category.clone(),
            value: score.value,
            timestamp: score.updated_at.unwrap_or_else(Utc::now),
        }
    }

    /// Project back to a [`Score`], carrying the row timestamp as `updated_at`.
    pub fn to_score(&self) -> Score {
        Score {
            model: self.model.clone(),
            label: self.label.clone(),
            framework: self.framework.clone(),
            category: self.category.clone(),
            value: self.value,
            updated_at: Some(self.timestamp),
        }
    }
}

/// Failure details handed to [`ResultStore::save_error`].
///
/// The error payload is already normalized to a message plus optional trace;
/// use [`ErrorDetails::from_error`] to flatten a live error value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub model: String,
    pub label: Option<String>,
    pub framework: Option<String>,
    pub category: Option<String>,
    pub evaluation_path: String,
    pub message: String,
    pub trace: Option<String>,
}

impl ErrorDetails {
    pub fn new(
        model: impl Into<String>,
        evaluation_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            label: None,
            framework: None,
            category: None,
            evaluation_path: evaluation_path.into(),
            message: message.into(),
            trace: None,
        }
    }

    /// Flatten an error into a message and a `caused by:` trace of its sources.
    pub fn from_error(
        model: impl Into<String>,
        evaluation_path: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
    ) -> Self {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            trace: (!trace.is_empty()).then(|| trace.join("\n")),
            ..Self::new(model, evaluation_path, err.to_string())
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_trace(mut self, trace: Option<String>) -> Self {
        self.trace = trace;
        self
    }
}

/// A persisted row from the `errors` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub run_id: RunId,
    pub model: String,
    pub label: Option<String>,
    pub framework: Option<String>,
    pub category: Option<String>,
    pub evaluation_path: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(run_id: &RunId, details: ErrorDetails) -> Self {
        Self {
            run_id: run_id.clone(),
            model: details.model,
            label: details.label,
            framework: details.framework,
            category: details.category,
            evaluation_path: details.evaluation_path,
            error_message: details.message,
            stack_trace: details.trace,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultStore
// ---------------------------------------------------------------------------

/// Append-only score and error log, keyed by run.
///
/// Guarantees:
/// - `initialize()` is idempotent and safe to call on every startup.
/// - `save_*` append exactly one row; there is no update or dedup.
/// - `get_results` returns rows newest-first by timestamp.
/// - `get_latest_results` returns every row of the run whose row was
///   inserted last (insertion order, not timestamp).
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Ensure the `results` and `errors` logs exist.
    async fn initialize(&self) -> StorageResult<()>;

    /// Append one score row.
    async fn save_result(&self, run_id: &RunId, score: &Score) -> StorageResult<()>;

    /// Append one error row.
    async fn save_error(&self, run_id: &RunId, details: ErrorDetails) -> StorageResult<()>;

    /// All score rows, optionally limited to one run, newest first.
    async fn get_results(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ScoreRecord>>;

    /// Rows of the most recently inserted run.
    async fn get_latest_results(&self) -> StorageResult<Vec<ScoreRecord>>;

    /// All error rows, optionally limited to one run, newest first.
    async fn get_errors(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ErrorRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn run_id_is_path_safe() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let id = RunId::at("run-mcp", now);
        assert_eq!(id.as_str(), "run-mcp-2025-03-04T05-06-07-000Z");
        assert!(!id.as_str().contains(':'));
    }

    #[test]
    fn score_serializes_camel_case_and_omits_missing_timestamp() {
        let score = Score {
            model: "gpt-4o".into(),
            label: "GPT-4o".into(),
            framework: "Next.js".into(),
            category: "Auth".into(),
            value: 0.5,
            updated_at: None,
        };
        let json = serde_json::to_string(&score).unwrap();
        assert!(!json.contains("updatedAt"));

        let stamped = Score {
            updated_at: Some(Utc::now()),
            ..score
        };
        let json = serde_json::to_string(&stamped).unwrap();
        assert!(json.contains("\"updatedAt\""));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("inner cause")]
    struct Inner;

    #[test]
    fn error_details_flatten_source_chain() {
        let err = Outer(Inner);
        let details = ErrorDetails::from_error("gpt-4o", "evals/auth/routes", &err);
        assert_eq!(details.message, "outer failure");
        assert_eq!(details.trace.as_deref(), Some("caused by: inner cause"));
    }
}
