//! Markdown transcripts written next to debug payloads.

use crate::backends::{AgentRun, StepRecord, SYSTEM_PROMPT};
use crate::domain::GraderOutcome;
use crate::graders::compute_score;

const ASSISTANT_PREVIEW: usize = 500;
const TOOL_RESULT_PREVIEW: usize = 1000;
const AGENT_OUTPUT_PREVIEW: usize = 10_000;

/// First `max` chars of `text`, and whether anything was cut.
fn clip(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn clip_noted(text: &str, max: usize) -> String {
    match clip(text, max) {
        (head, true) => format!(
            "{head}...\n\n_(truncated, {} chars total)_",
            text.chars().count()
        ),
        (all, false) => all.to_string(),
    }
}

/// Score line plus a PASS/FAIL table.
pub fn grader_section(outcomes: &[GraderOutcome]) -> String {
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let mut out = String::from("## Grader Results\n\n");
    out.push_str(&format!(
        "**Score: {:.1}%** ({}/{})\n\n",
        compute_score(outcomes) * 100.0,
        passed,
        outcomes.len()
    ));
    out.push_str("| Grader | Result |\n|--------|--------|\n");
    for o in outcomes {
        out.push_str(&format!(
            "| {} | {} |\n",
            o.name,
            if o.passed { "PASS" } else { "FAIL" }
        ));
    }
    out
}

pub fn direct_transcript(prompt: &str, response: &str, outcomes: &[GraderOutcome]) -> String {
    let mut out = String::from("# Evaluation Transcript\n\n");
    out.push_str(&format!("## Prompt\n\n```markdown\n{}\n```\n\n", prompt.trim()));
    out.push_str(&format!("## Response\n\n{}\n\n", response.trim()));
    out.push_str(&grader_section(outcomes));
    out
}

pub fn mcp_transcript(prompt: &str, steps: &[StepRecord], outcomes: &[GraderOutcome]) -> String {
    let mut out = String::from("# MCP Evaluation Transcript\n\n");
    out.push_str(&format!("## System Prompt\n\n```\n{}\n```\n\n", SYSTEM_PROMPT.trim()));
    out.push_str(&format!("## User Prompt\n\n```markdown\n{}\n```\n\n", prompt.trim()));
    out.push_str("---\n\n## Conversation\n\n");

    for (idx, step) in steps.iter().enumerate() {
        out.push_str(&format!("### Step {} ({})\n\n", idx + 1, step.finish_reason));
        if !step.text.is_empty() {
            out.push_str("**Assistant:**\n\n");
            out.push_str(&clip_noted(&step.text, ASSISTANT_PREVIEW));
            out.push_str("\n\n");
        }
        if !step.tool_calls.is_empty() {
            out.push_str("**Tool Calls:**\n\n");
            for call in &step.tool_calls {
                let args = serde_json::to_string_pretty(&call.arguments)
                    .unwrap_or_else(|_| call.arguments.to_string());
                out.push_str(&format!("`{}`\n```json\n{}\n```\n\n", call.name, args));
            }
        }
        if !step.tool_results.is_empty() {
            out.push_str("**Tool Results:**\n\n");
            for result in &step.tool_results {
                let body = if result.text.is_empty() {
                    "(no result)".to_string()
                } else {
                    clip_noted(&result.text, TOOL_RESULT_PREVIEW)
                };
                out.push_str(&format!("`{}` returned:\n```\n{}\n```\n\n", result.tool_name, body));
            }
        }
        out.push_str("---\n\n");
    }

    out.push_str(&grader_section(outcomes));
    out
}

pub fn agent_transcript(run: &AgentRun, output: &str, outcomes: &[GraderOutcome]) -> String {
    let mut out = format!("# {} Agent Transcript\n\n", run.agent_label);
    out.push_str("## Execution Info\n\n");
    out.push_str(&format!("- **Duration**: {:.2}s\n", run.duration.as_secs_f64()));
    out.push_str(&format!(
        "- **Exit Code**: {}\n",
        run.exit_code.map_or_else(|| "-1".to_string(), |c| c.to_string())
    ));
    out.push_str(&format!("- **Success**: {}\n\n", run.success));
    out.push_str(&format!("## Prompt\n\n```markdown\n{}\n```\n\n", run.prompt.trim()));

    let (head, cut) = clip(output, AGENT_OUTPUT_PREVIEW);
    out.push_str(&format!(
        "## Output\n\n```\n{}{}\n```\n\n",
        head,
        if cut { "\n... (truncated)" } else { "" }
    ));
    out.push_str(&grader_section(outcomes));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ToolResultRecord;
    use crate::providers::ToolCall;
    use std::time::Duration;

    fn outcomes() -> Vec<GraderOutcome> {
        vec![
            GraderOutcome {
                name: "a".into(),
                passed: true,
            },
            GraderOutcome {
                name: "b".into(),
                passed: false,
            },
        ]
    }

    #[test]
    fn grader_section_has_score_and_rows() {
        let section = grader_section(&outcomes());
        assert!(section.contains("**Score: 50.0%** (1/2)"));
        assert!(section.contains("| a | PASS |"));
        assert!(section.contains("| b | FAIL |"));
    }

    #[test]
    fn mcp_transcript_truncates_long_text() {
        let steps = vec![StepRecord {
            text: "x".repeat(600),
            finish_reason: "tool-calls".into(),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "search_docs".into(),
                arguments: serde_json::json!({"query": "middleware"}),
            }],
            tool_results: vec![ToolResultRecord {
                call_id: "call_1".into(),
                tool_name: "search_docs".into(),
                text: String::new(),
                is_error: false,
            }],
        }];
        let md = mcp_transcript("Add auth.", &steps, &outcomes());
        assert!(md.starts_with("# MCP Evaluation Transcript"));
        assert!(md.contains("### Step 1 (tool-calls)"));
        assert!(md.contains("_(truncated, 600 chars total)_"));
        assert!(md.contains("`search_docs` returned:\n```\n(no result)\n```"));
        assert!(md.contains("\"query\": \"middleware\""));
    }

    #[test]
    fn agent_transcript_reports_exit_status() {
        let run = AgentRun {
            agent_label: "Claude Code".into(),
            prompt: "do it".into(),
            duration: Duration::from_millis(1500),
            exit_code: Some(1),
            success: false,
        };
        let md = agent_transcript(&run, "partial output", &outcomes());
        assert!(md.starts_with("# Claude Code Agent Transcript"));
        assert!(md.contains("- **Duration**: 1.50s"));
        assert!(md.contains("- **Exit Code**: 1"));
        assert!(md.contains("partial output\n```"));
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let (head, cut) = clip("héllo", 2);
        assert_eq!(head, "hé");
        assert!(cut);
        assert_eq!(clip("hi", 5), ("hi", false));
    }
}
