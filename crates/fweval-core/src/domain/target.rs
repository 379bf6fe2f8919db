//! Execution targets: API models and CLI agents.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Model provider identity. Also the rate-limiter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Vercel,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Vercel,
        Provider::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Vercel => "vercel",
            Provider::Google => "google",
        }
    }

    /// Guess the provider from a bare model id.
    pub fn infer(model: &str) -> Provider {
        if model.starts_with("claude") {
            Provider::Anthropic
        } else if model.starts_with("gemini") {
            Provider::Google
        } else if model.starts_with("v0") {
            Provider::Vercel
        } else {
            Provider::OpenAi
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "vercel" => Ok(Provider::Vercel),
            "google" => Ok(Provider::Google),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// A (provider, model) pair evaluated through an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTarget {
    pub provider: Provider,
    pub model: String,
    pub label: String,
}

impl ModelTarget {
    pub fn new(provider: Provider, model: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            label: label.into(),
        }
    }
}

/// Supported CLI coding agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    ClaudeCode,
    Cursor,
}

impl AgentKind {
    pub const ALL: [AgentKind; 2] = [AgentKind::ClaudeCode, AgentKind::Cursor];

    pub fn id(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "claude-code",
            AgentKind::Cursor => "cursor",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "Claude Code",
            AgentKind::Cursor => "Cursor",
        }
    }

    /// Command name resolved on `PATH`.
    pub fn command(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "claude",
            AgentKind::Cursor => "cursor",
        }
    }

    /// Invocation arguments for a non-interactive run with `prompt`.
    pub fn args(&self, prompt: &str) -> Vec<String> {
        match self {
            AgentKind::ClaudeCode => vec![
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
                prompt.to_string(),
            ],
            AgentKind::Cursor => vec!["--print".to_string(), prompt.to_string()],
        }
    }

    pub fn available() -> Vec<String> {
        Self::ALL.iter().map(|a| a.id().to_string()).collect()
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.id() == s)
            .ok_or_else(|| format!("unknown agent: {s}"))
    }
}

/// A CLI agent with its executable already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTarget {
    pub kind: AgentKind,
    pub executable: PathBuf,
}

/// What a task runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    Model(ModelTarget),
    Agent(AgentTarget),
}

impl Target {
    /// Model id (or agent id) as stored in score records.
    pub fn id(&self) -> &str {
        match self {
            Target::Model(m) => &m.model,
            Target::Agent(a) => a.kind.id(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Target::Model(m) => &m.label,
            Target::Agent(a) => a.kind.label(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Model(m) => write!(f, "{}/{}", m.provider, m.model),
            Target::Agent(a) => write!(f, "agent:{}", a.kind),
        }
    }
}
