#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fweval_core::backends::{ExecutionBackend, Trace, AGENT_SYSTEM_INSTRUCTION};
use fweval_core::domain::AgentTarget;
use fweval_core::{
    load_entries, run_task, AgentBackend, AgentKind, BackendSet, ExecError, ExecutionMode,
    ModelTarget, Provider, RunFlags, Target, Task,
};

use common::*;

/// Write an executable shell script standing in for the agent CLI.
fn fake_agent(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn agent_task(evals: &Path, executable: PathBuf, flags: RunFlags) -> Task {
    write_eval(evals, "auth/routes", "Protect the routes.\n", X_AND_Y_GRADERS);
    let judge: Arc<dyn fweval_core::JudgeClient> = Arc::new(StaticJudge { score: Some(1.0) });
    let ctx = fweval_core::graders::GraderContext::new(judge);
    let entry = load_entries(vec![evaluation(evals, "auth/routes", "Auth")], &ctx)
        .unwrap()
        .remove(0);
    Task {
        target: Target::Agent(AgentTarget {
            kind: AgentKind::ClaudeCode,
            executable,
        }),
        evaluation: entry.evaluation,
        graders: entry.graders,
        flags,
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn agent_output_is_graded_and_work_dir_removed() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "echo \"X and Y\"");
    let work_root = dir.path().join(".agent-temp");
    let backend = AgentBackend::new(&work_root);
    let backends = BackendSet::new().with_agent(Arc::new(backend));

    let task = agent_task(dir.path(), script, RunFlags::default());
    let success = run_task(&task, &backends).await.unwrap();

    assert_eq!(success.score, 1.0);
    assert!(is_empty_dir(&work_root));
}

#[tokio::test]
async fn nonzero_exit_with_output_is_still_graded() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "echo \"X alone\"\nexit 3");
    let backend = AgentBackend::new(dir.path().join(".agent-temp"));

    let task = agent_task(dir.path(), script, RunFlags::default());
    let generation = backend.execute(&task, "Protect the routes.").await.unwrap();
    let Some(Trace::Agent(run)) = &generation.trace else {
        panic!("expected an agent trace");
    };
    assert_eq!(run.exit_code, Some(3));
    assert!(!run.success);
    assert_eq!(run.agent_label, "Claude Code");

    let backends = BackendSet::new().with_agent(Arc::new(backend));
    let success = run_task(&task, &backends).await.unwrap();
    assert_eq!(success.score, 0.5);
}

#[tokio::test]
async fn nonzero_exit_without_output_fails() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "exit 2");
    let backends = BackendSet::new().with_agent(Arc::new(AgentBackend::new(dir.path().join("work"))));

    let task = agent_task(dir.path(), script, RunFlags::default());
    let failure = run_task(&task, &backends).await.unwrap_err();
    assert_eq!(
        failure.message,
        "agent exited with status 2 and produced no output"
    );
}

#[tokio::test]
async fn stderr_counts_as_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "echo \"X\" 1>&2\nexit 1");
    let backend = AgentBackend::new(dir.path().join("work"));

    let task = agent_task(dir.path(), script, RunFlags::default());
    let generation = backend.execute(&task, "Protect the routes.").await.unwrap();
    assert_eq!(generation.response.trim(), "X");
}

#[tokio::test]
async fn hung_agent_is_killed_at_the_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "exec sleep 5");
    let work_root = dir.path().join(".agent-temp");
    let backend = AgentBackend::new(&work_root);

    let flags = RunFlags {
        timeout: Duration::from_millis(200),
        ..RunFlags::default()
    };
    let task = agent_task(dir.path(), script, flags);
    let started = std::time::Instant::now();
    let err = backend.execute(&task, "Protect the routes.").await.unwrap_err();

    assert!(matches!(err, ExecError::Timeout { ms: 200 }));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(is_empty_dir(&work_root));
}

#[tokio::test]
async fn agent_receives_instruction_and_prompt() {
    let dir = tempfile::tempdir().unwrap();
    // $1 and $2 are the non-interactive flags; the prompt is last.
    let script = fake_agent(dir.path(), "printf '%s' \"$3\"");
    let backend = AgentBackend::new(dir.path().join("work"));

    let task = agent_task(dir.path(), script, RunFlags::default());
    let generation = backend.execute(&task, "Protect the routes.").await.unwrap();

    assert!(generation.response.starts_with(AGENT_SYSTEM_INSTRUCTION.trim()));
    assert!(generation.response.ends_with("\n\n---\n\nProtect the routes."));
}

#[tokio::test]
async fn mcp_mode_writes_server_config_into_the_work_dir() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "cat .mcp.json");
    let backend = AgentBackend::new(dir.path().join("work")).with_mcp_server("https://mcp.example.dev/mcp");

    let flags = RunFlags {
        mode: ExecutionMode::Mcp,
        ..RunFlags::default()
    };
    let task = agent_task(dir.path(), script, flags);
    let generation = backend.execute(&task, "Protect the routes.").await.unwrap();

    let config: serde_json::Value = serde_json::from_str(&generation.response).unwrap();
    assert_eq!(config["mcpServers"]["clerk"]["url"], "https://mcp.example.dev/mcp");
}

#[tokio::test]
async fn direct_mode_leaves_no_mcp_config() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(
        dir.path(),
        "if [ -f .mcp.json ]; then echo present; else echo absent; fi",
    );
    let backend = AgentBackend::new(dir.path().join("work")).with_mcp_server("https://mcp.example.dev/mcp");

    let task = agent_task(dir.path(), script, RunFlags::default());
    let generation = backend.execute(&task, "Protect the routes.").await.unwrap();
    assert_eq!(generation.response.trim(), "absent");
}

#[tokio::test]
async fn model_targets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_agent(dir.path(), "echo X");
    let mut task = agent_task(dir.path(), script, RunFlags::default());
    task.target = Target::Model(ModelTarget::new(Provider::OpenAi, "gpt-4o", "GPT-4o"));

    let backend = AgentBackend::new(dir.path().join("work"));
    let err = backend.execute(&task, "Protect the routes.").await.unwrap_err();
    assert!(matches!(err, ExecError::UnsupportedTarget { .. }));
}
