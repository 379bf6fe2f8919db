//! Evaluation metadata.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Framework tag used when an evaluation does not declare one.
pub const DEFAULT_FRAMEWORK: &str = "Next.js";

/// A named task specification discovered from the evaluation tree.
///
/// Immutable once loaded. The definition tree is the source of truth;
/// evaluations are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Unique identifier, e.g. `evals/auth/routes`.
    pub path: String,
    pub framework: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directory holding `PROMPT.md` and `graders.toml`.
    #[serde(skip)]
    pub dir: PathBuf,
}

fn default_enabled() -> bool {
    true
}

impl Evaluation {
    pub fn new(path: impl Into<String>, category: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            path: path.into(),
            framework: DEFAULT_FRAMEWORK.to_string(),
            category: category.into(),
            name: None,
            enabled: true,
            dir,
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.dir.join("PROMPT.md")
    }

    pub fn graders_path(&self) -> PathBuf {
        self.dir.join("graders.toml")
    }

    /// Display name, falling back to the path.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }

    /// File-name-safe form of `path` (`/` replaced by `__`).
    pub fn slug(&self) -> String {
        self.path.replace('/', "__")
    }
}
