//! The per-task protocol: load prompt, generate, grade, score.

use serde_json::Value;
use tracing::instrument;

use crate::backends::{BackendSet, Generation, Trace};
use crate::domain::{
    DebugPayload, ExecError, GraderOutcome, Task, TaskFailure, TaskResult, TaskSuccess,
    ToolCallInfo, ToolResultInfo,
};
use crate::graders::compute_score;
use crate::transcript;

/// Run one task to a plain-data outcome. Never panics on task errors.
#[instrument(skip_all, fields(task_target = %task.target, evaluation = %task.evaluation.path))]
pub async fn run_task(task: &Task, backends: &BackendSet) -> TaskResult {
    execute(task, backends)
        .await
        .map_err(|e| TaskFailure::from_error(&e))
}

async fn execute(task: &Task, backends: &BackendSet) -> Result<TaskSuccess, ExecError> {
    let backend = backends.select(task)?;

    let prompt_path = task.evaluation.prompt_path();
    let prompt = tokio::fs::read_to_string(&prompt_path)
        .await
        .map_err(|source| ExecError::Prompt {
            path: prompt_path.display().to_string(),
            source,
        })?;

    let timeout = task.flags.timeout;
    let generation = tokio::time::timeout(timeout, backend.execute(task, &prompt))
        .await
        .map_err(|_| ExecError::Timeout {
            ms: timeout.as_millis() as u64,
        })??;

    let graders = task.graders.grade(&generation.response).await?;
    let score = compute_score(&graders);
    let debug = task
        .flags
        .debug
        .then(|| debug_payload(&prompt, &generation, &graders));

    Ok(TaskSuccess {
        score,
        graders,
        debug,
    })
}

/// Assemble the debug record for a graded generation.
pub fn debug_payload(prompt: &str, generation: &Generation, graders: &[GraderOutcome]) -> DebugPayload {
    let response = generation.response.clone();
    match &generation.trace {
        None => DebugPayload {
            prompt: prompt.to_string(),
            transcript: Some(transcript::direct_transcript(prompt, &response, graders)),
            response,
            graders: graders.to_vec(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        },
        Some(Trace::Mcp { steps }) => DebugPayload {
            prompt: prompt.to_string(),
            transcript: Some(transcript::mcp_transcript(prompt, steps, graders)),
            response,
            graders: graders.to_vec(),
            tool_calls: steps
                .iter()
                .flat_map(|s| &s.tool_calls)
                .map(|c| ToolCallInfo {
                    tool_name: c.name.clone(),
                    args: c.arguments.clone(),
                })
                .collect(),
            tool_results: steps
                .iter()
                .flat_map(|s| &s.tool_results)
                .map(|r| ToolResultInfo {
                    tool_name: r.tool_name.clone(),
                    result: if r.text.is_empty() {
                        Value::String("(no result)".into())
                    } else {
                        Value::String(r.text.clone())
                    },
                })
                .collect(),
        },
        Some(Trace::Agent(run)) => DebugPayload {
            prompt: run.prompt.clone(),
            transcript: Some(transcript::agent_transcript(run, &response, graders)),
            response,
            graders: graders.to_vec(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        },
    }
}
