//! Reporting: progress lines, console summary, and JSON artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fweval_state::Score;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dispatcher::RunReport;
use crate::domain::{DebugPayload, TaskFailure};

/// Per-task progress notifications from the dispatcher.
///
/// `done` counts settled tasks, including this one.
pub trait ProgressSink: Send + Sync {
    fn task_started(&self, label: &str, evaluation: &str);
    fn task_scored(&self, label: &str, evaluation: &str, score: f64, done: usize, total: usize);
    fn task_failed(
        &self,
        label: &str,
        evaluation: &str,
        failure: &TaskFailure,
        done: usize,
        total: usize,
    );
}

/// `[start]`, `[error]` and `[done n/total]` lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn task_started(&self, label: &str, evaluation: &str) {
        println!("[start] {label} {evaluation}");
    }

    fn task_scored(&self, label: &str, evaluation: &str, score: f64, done: usize, total: usize) {
        println!("[done {done}/{total}] {label} {evaluation} {:.1}%", score * 100.0);
    }

    fn task_failed(
        &self,
        label: &str,
        _evaluation: &str,
        failure: &TaskFailure,
        _done: usize,
        _total: usize,
    ) {
        println!("[error] {label}: {}", failure.message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn task_started(&self, _: &str, _: &str) {}
    fn task_scored(&self, _: &str, _: &str, _: f64, _: usize, _: usize) {}
    fn task_failed(&self, _: &str, _: &str, _: &TaskFailure, _: usize, _: usize) {}
}

/// Consumes a finished run.
pub trait Reporter {
    fn report(&self, run: &RunReport) -> Result<()>;
}

/// Prints [`render_summary`] to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, run: &RunReport) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(render_summary(run).as_bytes())
            .context("write summary")?;
        Ok(())
    }
}

/// Writes the run's scores to a JSON file.
#[derive(Debug, Clone)]
pub struct ScoreFileReporter {
    pub path: PathBuf,
}

impl Reporter for ScoreFileReporter {
    fn report(&self, run: &RunReport) -> Result<()> {
        write_scores_json(&self.path, &run.scores())
    }
}

/// Average score per label and category, plus success/failure counts.
pub fn render_summary(run: &RunReport) -> String {
    let scores = run.scores();
    let categories: BTreeSet<&str> = scores.iter().map(|s| s.category.as_str()).collect();
    let mut cells: BTreeMap<&str, BTreeMap<&str, (f64, usize)>> = BTreeMap::new();
    for s in &scores {
        let cell = cells
            .entry(s.label.as_str())
            .or_default()
            .entry(s.category.as_str())
            .or_insert((0.0, 0));
        cell.0 += s.value;
        cell.1 += 1;
    }

    let mut out = format!("\nRun {}\n\n", run.run_id);
    if !scores.is_empty() {
        out.push_str("| Model |");
        for c in &categories {
            out.push_str(&format!(" {c} |"));
        }
        out.push_str("\n|-------|");
        for _ in &categories {
            out.push_str("------|");
        }
        out.push('\n');
        for (label, row) in &cells {
            out.push_str(&format!("| {label} |"));
            for c in &categories {
                match row.get(c) {
                    Some((sum, n)) => out.push_str(&format!(" {:.1}% |", sum / *n as f64 * 100.0)),
                    None => out.push_str(" - |"),
                }
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{} succeeded, {} failed, {} total in {:.1}s\n",
        run.succeeded(),
        run.failed(),
        run.tasks.len(),
        run.duration.as_secs_f64()
    ));
    out
}

/// Write pretty JSON via a temp file in the same directory, then rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serialize json artifact")?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).with_context(|| format!("temp file in {:?}", dir))?;
    tmp.write_all(content.as_bytes())
        .with_context(|| format!("write {:?}", tmp.path()))?;
    tmp.persist(path).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

pub fn write_scores_json(path: &Path, scores: &[Score]) -> Result<()> {
    write_json_atomic(path, scores)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {:?}", path))
}

/// Scores from `path`; a missing file reads as empty.
pub fn read_scores_json(path: &Path) -> Result<Vec<Score>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "score file not found, using empty set");
        return Ok(Vec::new());
    }
    read_json(path)
}

/// `<stem>.json` with the payload and `<stem>.md` with its transcript.
pub async fn write_debug_artifacts(dir: &Path, stem: &str, payload: &DebugPayload) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create {:?}", dir))?;
    let json_path = dir.join(format!("{stem}.json"));
    let content = serde_json::to_string_pretty(payload).context("serialize debug payload")?;
    tokio::fs::write(&json_path, content)
        .await
        .with_context(|| format!("write {:?}", json_path))?;
    if let Some(transcript) = &payload.transcript {
        let md_path = dir.join(format!("{stem}.md"));
        tokio::fs::write(&md_path, transcript)
            .await
            .with_context(|| format!("write {:?}", md_path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GraderOutcome;

    fn score(label: &str, category: &str, value: f64) -> Score {
        Score {
            model: label.to_lowercase(),
            label: label.into(),
            framework: "Next.js".into(),
            category: category.into(),
            value,
            updated_at: None,
        }
    }

    #[test]
    fn scores_file_round_trips_and_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        write_scores_json(&path, &[score("GPT-4o", "Auth", 0.5)]).unwrap();
        write_scores_json(&path, &[score("GPT-4o", "Auth", 1.0)]).unwrap();

        let back = read_scores_json(&path).unwrap();
        assert_eq!(back, vec![score("GPT-4o", "Auth", 1.0)]);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_scores_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_scores_json(&dir.path().join("scores-mcp.json")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn debug_artifacts_write_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let payload = DebugPayload {
            prompt: "p".into(),
            response: "r".into(),
            graders: vec![GraderOutcome {
                name: "a".into(),
                passed: true,
            }],
            tool_calls: vec![],
            tool_results: vec![],
            transcript: Some("# Evaluation Transcript".into()),
        };
        let run_dir = dir.path().join("run-1");
        write_debug_artifacts(&run_dir, "evals__auth__routes__gpt-4o", &payload)
            .await
            .unwrap();

        let raw = std::fs::read_to_string(run_dir.join("evals__auth__routes__gpt-4o.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["graders"][0]["name"], "a");
        assert!(value.get("toolCalls").is_none());
        assert!(run_dir.join("evals__auth__routes__gpt-4o.md").exists());
    }
}
