//! CLI coding agents run as subprocesses.
//!
//! Each task gets a fresh work directory under [`AGENT_WORK_DIR`], optionally
//! seeded with `.mcp.json`, which is removed when the task settles.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{build_agent_prompt, unsupported, AgentRun, ExecutionBackend, Generation, Trace};
use crate::domain::{AgentKind, AgentTarget, ConfigError, ExecError, ExecutionMode, Target, Task};
use crate::obs;

pub const AGENT_WORK_DIR: &str = ".agent-temp";

/// Resolve an agent's executable on the current `PATH`.
///
/// Runs once per CLI invocation, before any task is dispatched.
pub fn resolve_agent(kind: AgentKind) -> Result<AgentTarget, ConfigError> {
    let executable = which::which(kind.command()).map_err(|e| ConfigError::ExecutableNotFound {
        command: kind.command().to_string(),
        reason: e.to_string(),
    })?;
    Ok(AgentTarget { kind, executable })
}

/// Write `.mcp.json` pointing the agent at `server_url`.
pub async fn write_mcp_config(dir: &Path, server_url: &str) -> Result<PathBuf, ExecError> {
    let config = json!({
        "mcpServers": {
            "clerk": {
                "type": "url",
                "url": server_url,
            }
        }
    });
    let path = dir.join(".mcp.json");
    let raw = serde_json::to_string_pretty(&config)
        .map_err(|e| ExecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    tokio::fs::write(&path, raw).await?;
    Ok(path)
}

pub struct AgentBackend {
    work_root: PathBuf,
    mcp_server_url: Option<String>,
    env_path: Option<OsString>,
}

impl AgentBackend {
    /// Captures the outer process `PATH` for every spawned agent.
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            mcp_server_url: None,
            env_path: std::env::var_os("PATH"),
        }
    }

    /// Server written into `.mcp.json` for tool-augmented tasks.
    pub fn with_mcp_server(mut self, url: impl Into<String>) -> Self {
        self.mcp_server_url = Some(url.into());
        self
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    async fn spawn(
        &self,
        agent: &AgentTarget,
        prompt: &str,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<(AgentRun, String), ExecError> {
        let mut cmd = Command::new(&agent.executable);
        cmd.args(agent.kind.args(prompt))
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = &self.env_path {
            cmd.env("PATH", path);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: agent.executable.display().to_string(),
            source,
        })?;

        // Dropping the wait future on timeout kills the child.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                ms: timeout.as_millis() as u64,
            })??;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let run = AgentRun {
            agent_label: agent.kind.label().to_string(),
            prompt: prompt.to_string(),
            duration: started.elapsed(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };
        debug!(exit_code = ?run.exit_code, bytes = combined.len(), "agent exited");

        // A failed run that still printed something is graded.
        if !run.success && combined.is_empty() {
            return Err(ExecError::NoOutput {
                exit_code: run.exit_code,
            });
        }
        Ok((run, combined))
    }
}

#[async_trait]
impl ExecutionBackend for AgentBackend {
    fn name(&self) -> &'static str {
        "agent"
    }

    #[instrument(skip(self, task, prompt), fields(task_target = %task.target, evaluation = %task.evaluation.path))]
    async fn execute(&self, task: &Task, prompt: &str) -> Result<Generation, ExecError> {
        let Target::Agent(agent) = &task.target else {
            return Err(unsupported(self.name(), &task.target));
        };
        let prompt = build_agent_prompt(prompt);

        tokio::fs::create_dir_all(&self.work_root).await?;
        let work_dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.work_root)?;

        let outcome = async {
            if task.flags.mode == ExecutionMode::Mcp {
                if let Some(url) = &self.mcp_server_url {
                    write_mcp_config(work_dir.path(), url).await?;
                }
            }
            self.spawn(agent, &prompt, work_dir.path(), task.flags.timeout)
                .await
        }
        .await;

        let dir = work_dir.path().to_path_buf();
        if let Err(e) = work_dir.close() {
            obs::emit_cleanup_failed(&dir.display().to_string(), &e);
        }

        let (run, output) = outcome?;
        Ok(Generation {
            response: output,
            trace: Some(Trace::Agent(run)),
        })
    }
}
