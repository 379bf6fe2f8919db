//! fweval core: the task execution and scoring engine.
//!
//! Evaluations are discovered from a definition tree ([`catalog`]), crossed
//! with targets into [`Task`]s, and run by the [`Dispatcher`] through one of
//! the [`backends`]. Each response is scored by its evaluation's
//! [`GraderSet`]; outcomes land in a [`fweval_state::ResultStore`].

pub mod aggregate;
pub mod backends;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod domain;
pub mod filter;
pub mod graders;
pub mod judge;
pub mod mcp;
pub mod obs;
pub mod providers;
pub mod rate_limiter;
pub mod reporting;
pub mod runner;
pub mod telemetry;
pub mod transcript;

pub use aggregate::{aggregate, merge_scores, split_by_mode, AggregationPolicy, MergedScore};
pub use backends::{
    AgentBackend, BackendSet, DirectBackend, ExecutionBackend, Generation, McpBackend, Trace,
};
pub use catalog::{discover, load_entries, CatalogEntry};
pub use config::{HarnessConfig, RateLimitConfig};
pub use context::EvalContext;
pub use dispatcher::{plan_tasks, Dispatcher, RunReport, TaskReport};
pub use domain::{
    AgentKind, ConfigError, Evaluation, ExecError, ExecutionMode, ModelTarget, Provider,
    RunFlags, Target, Task, TaskFailure, TaskResult, TaskSuccess,
};
pub use filter::{select_evaluations, select_models};
pub use graders::{compute_score, define_graders, Grade, Grader, GraderSet};
pub use judge::{judge, register_judges, JudgeClient, Rubric};
pub use rate_limiter::RateLimiter;
pub use reporting::{ConsoleProgress, ProgressSink, Reporter};
pub use runner::run_task;
pub use telemetry::init_tracing;
