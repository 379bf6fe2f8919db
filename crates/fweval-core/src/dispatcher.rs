//! Bounded-concurrency dispatch of (target × evaluation) tasks.
//!
//! Every task runs in its own tokio task behind a semaphore. A task's
//! outcome, success or failure, is persisted and reported as soon as it
//! settles; nothing one task does can abort its siblings.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fweval_state::{ErrorDetails, ResultStore, RunId, Score};
use tokio::sync::Semaphore;
use tracing::{warn, Instrument};

use crate::backends::BackendSet;
use crate::catalog::CatalogEntry;
use crate::domain::{Evaluation, RunFlags, Target, Task, TaskFailure, TaskResult};
use crate::obs;
use crate::reporting::{write_debug_artifacts, ProgressSink, SilentProgress};
use crate::runner::run_task;

/// Worker ceiling for API-backed runs.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Worker ceiling for agent runs; each worker owns a subprocess.
pub const DEFAULT_AGENT_CONCURRENCY: usize = 4;
pub const DEFAULT_DEBUG_DIR: &str = "debug-runs";

/// Cross product of targets and evaluations, target-major.
pub fn plan_tasks(targets: &[Target], entries: &[CatalogEntry], flags: RunFlags) -> Vec<Task> {
    targets
        .iter()
        .flat_map(|target| {
            entries.iter().map(move |entry| Task {
                target: target.clone(),
                evaluation: Arc::clone(&entry.evaluation),
                graders: Arc::clone(&entry.graders),
                flags,
            })
        })
        .collect()
}

/// The settled outcome of one task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub target: Target,
    pub label: String,
    pub evaluation: Arc<Evaluation>,
    pub result: TaskResult,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    fn settle(task: &Task, result: TaskResult, duration: Duration) -> Self {
        Self {
            target: task.target.clone(),
            label: task.label(),
            evaluation: Arc::clone(&task.evaluation),
            result,
            duration,
            finished_at: Utc::now(),
        }
    }

    pub fn score(&self) -> Option<Score> {
        let success = self.result.as_ref().ok()?;
        Some(Score {
            model: self.target.id().to_string(),
            label: self.label.clone(),
            framework: self.evaluation.framework.clone(),
            category: self.evaluation.category.clone(),
            value: success.score,
            updated_at: Some(self.finished_at),
        })
    }

    pub fn error_details(&self) -> Option<ErrorDetails> {
        let failure = self.result.as_ref().err()?;
        Some(
            ErrorDetails::new(
                self.target.id(),
                self.evaluation.path.clone(),
                failure.message.clone(),
            )
            .with_label(self.label.clone())
            .with_framework(self.evaluation.framework.clone())
            .with_category(self.evaluation.category.clone())
            .with_trace(failure.trace.clone()),
        )
    }
}

/// Everything one dispatch cycle produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub tasks: Vec<TaskReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn scores(&self) -> Vec<Score> {
        self.tasks.iter().filter_map(TaskReport::score).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.tasks.iter().filter(|t| t.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.tasks.len() - self.succeeded()
    }
}

pub struct Dispatcher {
    backends: BackendSet,
    store: Arc<dyn ResultStore>,
    progress: Arc<dyn ProgressSink>,
    concurrency: usize,
    debug_root: PathBuf,
}

impl Dispatcher {
    pub fn new(backends: BackendSet, store: Arc<dyn ResultStore>) -> Self {
        Self {
            backends,
            store,
            progress: Arc::new(SilentProgress),
            concurrency: DEFAULT_CONCURRENCY,
            debug_root: PathBuf::from(DEFAULT_DEBUG_DIR),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// At least one worker is always used.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Debug artifacts go to `<root>/<run id>/`.
    pub fn with_debug_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.debug_root = root.into();
        self
    }

    pub fn debug_dir(&self, run_id: &RunId) -> PathBuf {
        self.debug_root.join(run_id.as_str())
    }

    /// Run every task and wait for all of them to settle.
    ///
    /// Reports come back in task order; completion order is not observable.
    pub async fn dispatch(&self, run_id: &RunId, tasks: Vec<Task>) -> RunReport {
        self.dispatch_all(run_id, tasks)
            .instrument(obs::run_span(run_id.as_str()))
            .await
    }

    async fn dispatch_all(&self, run_id: &RunId, tasks: Vec<Task>) -> RunReport {
        let started = Instant::now();
        let total = tasks.len();
        obs::emit_run_started(run_id.as_str(), total, self.concurrency);

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let settle = Arc::new(Settle {
            store: Arc::clone(&self.store),
            progress: Arc::clone(&self.progress),
            run_id: run_id.clone(),
            done: AtomicUsize::new(0),
            total,
            debug_dir: self.debug_dir(run_id),
        });

        let mut handles = Vec::with_capacity(total);
        for task in tasks {
            let sem = Arc::clone(&sem);
            let backends = self.backends.clone();
            let settle = Arc::clone(&settle);
            let owned = task.clone();
            let handle = tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let label = owned.label();
                    settle.progress.task_started(&label, &owned.evaluation.path);
                    obs::emit_task_started(&label, &owned.evaluation.path);

                    let t0 = Instant::now();
                    let result = run_task(&owned, &backends).await;
                    let report = TaskReport::settle(&owned, result, t0.elapsed());
                    settle.record(&owned, &report).await;
                    report
                }
                .in_current_span(),
            );
            handles.push((task, handle));
        }

        let mut reports = Vec::with_capacity(total);
        for (task, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(join_err) => {
                    // The worker died before recording anything.
                    let failure = TaskFailure::new(format!("task aborted: {join_err}"));
                    let report = TaskReport::settle(&task, Err(failure), Duration::ZERO);
                    settle.record(&task, &report).await;
                    reports.push(report);
                }
            }
        }

        let report = RunReport {
            run_id: run_id.clone(),
            tasks: reports,
            duration: started.elapsed(),
        };
        obs::emit_run_finished(
            run_id.as_str(),
            report.duration.as_millis() as u64,
            report.succeeded(),
            report.failed(),
        );
        report
    }
}

/// Per-task persistence and progress.
struct Settle {
    store: Arc<dyn ResultStore>,
    progress: Arc<dyn ProgressSink>,
    run_id: RunId,
    done: AtomicUsize,
    total: usize,
    debug_dir: PathBuf,
}

impl Settle {
    async fn record(&self, task: &Task, report: &TaskReport) {
        let path = report.evaluation.path.as_str();
        match &report.result {
            Ok(success) => {
                if let Some(score) = report.score() {
                    if let Err(e) = self.store.save_result(&self.run_id, &score).await {
                        warn!(error = %e, evaluation = %path, "failed to persist score");
                    }
                }
                if let Some(debug) = &success.debug {
                    let stem = task.artifact_stem();
                    if let Err(e) = write_debug_artifacts(&self.debug_dir, &stem, debug).await {
                        warn!(error = %e, evaluation = %path, "failed to write debug artifact");
                    }
                }
                let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
                obs::emit_task_scored(
                    &report.label,
                    path,
                    success.score,
                    report.duration.as_millis() as u64,
                );
                self.progress
                    .task_scored(&report.label, path, success.score, done, self.total);
            }
            Err(failure) => {
                if let Some(details) = report.error_details() {
                    if let Err(e) = self.store.save_error(&self.run_id, details).await {
                        warn!(error = %e, evaluation = %path, "failed to persist error");
                    }
                }
                let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
                obs::emit_task_failed(&report.label, path, failure);
                self.progress
                    .task_failed(&report.label, path, failure, done, self.total);
            }
        }
    }
}
