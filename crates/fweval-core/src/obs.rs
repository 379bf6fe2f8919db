//! Structured observability hooks for run and task lifecycle events.
//!
//! Events are emitted at `info!` level (warnings for cleanup problems) with an
//! `event` field, so JSON logs can be filtered by it.

use tracing::{info, warn, Span};

/// Span tagging everything a dispatch cycle logs with its run id.
///
/// Attach with [`tracing::Instrument`]; the span must not be entered across
/// an `.await`.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("fweval.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, tasks: usize, concurrency: usize) {
    info!(event = "run_started", run_id = %run_id, tasks, concurrency);
}

pub fn emit_task_started(target: &str, evaluation: &str) {
    info!(event = "task_started", task_target = %target, evaluation = %evaluation);
}

pub fn emit_task_scored(target: &str, evaluation: &str, score: f64, duration_ms: u64) {
    info!(
        event = "task_scored",
        task_target = %target,
        evaluation = %evaluation,
        score,
        duration_ms,
    );
}

pub fn emit_task_failed(target: &str, evaluation: &str, error: &dyn std::fmt::Display) {
    warn!(event = "task_failed", task_target = %target, evaluation = %evaluation, error = %error);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, succeeded: usize, failed: usize) {
    info!(
        event = "run_finished",
        run_id = %run_id,
        duration_ms,
        succeeded,
        failed,
    );
}

/// Cleanup failures are logged and never escalated.
pub fn emit_cleanup_failed(resource: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cleanup_failed", resource = %resource, error = %error);
}
