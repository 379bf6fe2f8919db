//! fweval - framework integration evaluations for models and coding agents
//!
//! ## Commands
//!
//! - `run`: evaluate API models, directly or with MCP tools
//! - `agent`: evaluate a CLI coding agent
//! - `export`: aggregate stored results into score files
//! - `merge`: combine baseline and MCP score files
//! - `list`: show the evaluation and model catalogs
//! - `results`: print stored results

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use fweval_core::backends::{resolve_agent, AGENT_WORK_DIR};
use fweval_core::catalog::DEFAULT_EVALS_DIR;
use fweval_core::dispatcher::{DEFAULT_AGENT_CONCURRENCY, DEFAULT_CONCURRENCY, DEFAULT_DEBUG_DIR};
use fweval_core::domain::DEFAULT_TASK_TIMEOUT;
use fweval_core::providers::catalog;
use fweval_core::reporting::{read_scores_json, write_json_atomic, ConsoleReporter, ScoreFileReporter};
use fweval_core::{
    aggregate, discover, load_entries, merge_scores, plan_tasks, select_evaluations,
    select_models, split_by_mode, AgentKind, AggregationPolicy, BackendSet, ConfigError,
    ConsoleProgress, Dispatcher, EvalContext, ExecutionMode, HarnessConfig, Reporter, RunFlags,
    RunReport, Target, Task,
};
use fweval_state::{ResultStore, RunId, Score, SurrealResultStore};

const SCORES_FILE: &str = "scores.json";
const MCP_SCORES_FILE: &str = "scores-mcp.json";
const AGENT_SCORES_FILE: &str = "agent-scores.json";
const MERGED_SCORES_FILE: &str = "llm-scores.json";

#[derive(Parser)]
#[command(name = "fweval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Framework integration evaluations for LLMs and coding agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that dispatches tasks.
#[derive(Args, Debug, Clone)]
struct DispatchArgs {
    /// Evaluation path, suffix or category to run (repeatable)
    #[arg(short, long = "eval")]
    eval: Vec<String>,

    /// Write a JSON payload and markdown transcript per task
    #[arg(short, long)]
    debug: bool,

    /// Give targets MCP tools
    #[arg(long)]
    mcp: bool,

    /// Per-task timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TASK_TIMEOUT.as_millis() as u64)]
    timeout: u64,

    /// Maximum tasks in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Root of the evaluation tree
    #[arg(long, default_value = DEFAULT_EVALS_DIR)]
    evals_dir: PathBuf,

    /// Directory the score file is written to
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

impl DispatchArgs {
    fn flags(&self) -> RunFlags {
        RunFlags {
            debug: self.debug,
            mode: if self.mcp {
                ExecutionMode::Mcp
            } else {
                ExecutionMode::Direct
            },
            timeout: Duration::from_millis(self.timeout),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate API models
    Run {
        #[command(flatten)]
        dispatch: DispatchArgs,

        /// Only models whose id or label contains this
        #[arg(short, long)]
        model: Option<String>,

        /// Model steps allowed per MCP task
        #[arg(long, default_value_t = fweval_core::backends::DEFAULT_MAX_TOOL_ROUNDS)]
        max_tool_rounds: usize,
    },

    /// Evaluate a CLI coding agent
    Agent {
        #[command(flatten)]
        dispatch: DispatchArgs,

        /// Agent to run (claude-code, cursor)
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Aggregate stored results into scores.json and scores-mcp.json
    Export {
        /// `best` (best score ever per key) or `latest` (latest run average)
        #[arg(long, default_value_t = AggregationPolicy::Best)]
        policy: AggregationPolicy,

        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Merge baseline and MCP score files
    Merge {
        #[arg(long, default_value = SCORES_FILE)]
        baseline: PathBuf,

        #[arg(long, default_value = MCP_SCORES_FILE)]
        mcp: PathBuf,

        #[arg(long, default_value = MERGED_SCORES_FILE)]
        out: PathBuf,
    },

    /// Show evaluations and models
    List {
        #[arg(long, default_value = DEFAULT_EVALS_DIR)]
        evals_dir: PathBuf,
    },

    /// Print stored results
    Results {
        /// Results of one run
        #[arg(long, conflicts_with = "latest")]
        run: Option<String>,

        /// Average of each model's most recent run, per category. Without
        /// `--run` or `--latest`, the most recently written run is shown.
        #[arg(long)]
        latest: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    fweval_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            dispatch,
            model,
            max_tool_rounds,
        } => {
            let ctx = EvalContext::new(HarnessConfig::from_env(), open_store().await?);
            cmd_run(&ctx, &dispatch, model.as_deref(), max_tool_rounds).await
        }
        Commands::Agent { dispatch, agent } => {
            // Resolve before connecting to anything.
            let kind = parse_agent(agent.as_deref())?;
            let target = resolve_agent(kind)?;
            info!(agent = %kind, executable = %target.executable.display(), "resolved agent");
            let ctx = EvalContext::new(HarnessConfig::from_env(), open_store().await?);
            cmd_agent(&ctx, &dispatch, Target::Agent(target), Path::new(AGENT_WORK_DIR)).await
        }
        Commands::Export { policy, out } => {
            let store = open_store().await?;
            cmd_export(store.as_ref(), policy, &out).await
        }
        Commands::Merge { baseline, mcp, out } => cmd_merge(&baseline, &mcp, &out),
        Commands::List { evals_dir } => cmd_list(&evals_dir),
        Commands::Results { run, latest } => {
            let view = match (run.as_deref(), latest) {
                (Some(id), _) => ResultsView::Run(id),
                (None, true) => ResultsView::LatestPerModel,
                (None, false) => ResultsView::LastRun,
            };
            let store = open_store().await?;
            cmd_results(store.as_ref(), view).await
        }
    }
}

async fn open_store() -> Result<Arc<dyn ResultStore>> {
    let store = SurrealResultStore::from_env()
        .await
        .context("Failed to connect to fweval database")?;
    Ok(Arc::new(store))
}

/// Missing and unknown agents are configuration errors, so both exit 1.
fn parse_agent(agent: Option<&str>) -> Result<AgentKind, ConfigError> {
    let Some(agent) = agent else {
        return Err(ConfigError::MissingAgent {
            available: AgentKind::available(),
        });
    };
    AgentKind::from_str(agent).map_err(|_| ConfigError::UnknownAgent {
        agent: agent.to_string(),
        available: AgentKind::available(),
    })
}

/// Discover, filter and load the evaluations a dispatch runs.
fn load_catalog(ctx: &EvalContext, args: &DispatchArgs) -> Result<Vec<fweval_core::CatalogEntry>> {
    let evaluations = select_evaluations(discover(&args.evals_dir)?, &args.eval)?;
    let grader_ctx = ctx.grader_context(&args.evals_dir)?;
    Ok(load_entries(evaluations, &grader_ctx)?)
}

async fn dispatch_and_report(
    ctx: &EvalContext,
    backends: BackendSet,
    run_id: RunId,
    tasks: Vec<Task>,
    concurrency: usize,
    score_file: PathBuf,
) -> Result<RunReport> {
    println!("Run {} ({} tasks)", run_id, tasks.len());
    let dispatcher = Dispatcher::new(backends, Arc::clone(&ctx.store))
        .with_progress(Arc::new(ConsoleProgress))
        .with_concurrency(concurrency)
        .with_debug_root(DEFAULT_DEBUG_DIR);
    let report = dispatcher.dispatch(&run_id, tasks).await;

    ConsoleReporter.report(&report)?;
    ScoreFileReporter {
        path: score_file.clone(),
    }
    .report(&report)?;
    println!("Scores written to {:?}", score_file);
    Ok(report)
}

async fn cmd_run(
    ctx: &EvalContext,
    args: &DispatchArgs,
    model: Option<&str>,
    max_tool_rounds: usize,
) -> Result<()> {
    let entries = load_catalog(ctx, args)?;
    let targets: Vec<Target> = select_models(catalog::models(), model)?
        .into_iter()
        .map(Target::Model)
        .collect();

    let flags = args.flags();
    let backends = BackendSet::new()
        .with_direct(Arc::new(ctx.direct_backend()))
        .with_mcp(Arc::new(ctx.mcp_backend(max_tool_rounds)));
    let (prefix, file) = match flags.mode {
        ExecutionMode::Direct => ("run", SCORES_FILE),
        ExecutionMode::Mcp => ("run-mcp", MCP_SCORES_FILE),
    };

    dispatch_and_report(
        ctx,
        backends,
        RunId::new(prefix),
        plan_tasks(&targets, &entries, flags),
        args.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
        args.out.join(file),
    )
    .await?;
    Ok(())
}

async fn cmd_agent(ctx: &EvalContext, args: &DispatchArgs, target: Target, work_root: &Path) -> Result<()> {
    let entries = load_catalog(ctx, args)?;
    let flags = args.flags();
    let prefix = match flags.mode {
        ExecutionMode::Direct => format!("agent-{}", target.id()),
        ExecutionMode::Mcp => format!("agent-{}-mcp", target.id()),
    };
    let backends = BackendSet::new().with_agent(Arc::new(ctx.agent_backend(work_root)));

    dispatch_and_report(
        ctx,
        backends,
        RunId::new(&prefix),
        plan_tasks(&[target], &entries, flags),
        args.concurrency.unwrap_or(DEFAULT_AGENT_CONCURRENCY),
        args.out.join(AGENT_SCORES_FILE),
    )
    .await?;
    Ok(())
}

async fn cmd_export(store: &dyn ResultStore, policy: AggregationPolicy, out: &Path) -> Result<()> {
    let records = store
        .get_results(None)
        .await
        .context("Failed to read results")?;
    let (baseline, mcp) = split_by_mode(aggregate(&records, policy));

    let baseline_path = out.join(SCORES_FILE);
    let mcp_path = out.join(MCP_SCORES_FILE);
    write_json_atomic(&baseline_path, &baseline)?;
    write_json_atomic(&mcp_path, &mcp)?;

    println!(
        "Exported {} rows ({} policy): {} baseline to {:?}, {} MCP to {:?}",
        records.len(),
        policy,
        baseline.len(),
        baseline_path,
        mcp.len(),
        mcp_path
    );
    Ok(())
}

fn cmd_merge(baseline: &Path, mcp: &Path, out: &Path) -> Result<()> {
    let baseline_scores = read_scores_json(baseline)?;
    let mcp_scores = read_scores_json(mcp)?;
    let merged = merge_scores(&baseline_scores, &mcp_scores);
    write_json_atomic(out, &merged)?;

    let with_mcp = merged.iter().filter(|m| m.mcp_score.is_some()).count();
    println!(
        "Merged {} rows ({} with MCP scores) into {:?}",
        merged.len(),
        with_mcp,
        out
    );
    Ok(())
}

fn cmd_list(evals_dir: &Path) -> Result<()> {
    let evaluations = discover(evals_dir)?;
    println!("Evaluations ({}):", evaluations.len());
    for e in &evaluations {
        let status = if e.enabled { "" } else { " [disabled]" };
        println!(
            "  {:<45} {:<20} {}{}",
            e.path, e.category, e.framework, status
        );
    }

    println!();
    println!("Models ({}):", catalog::models().len());
    for m in catalog::models() {
        println!("  {:<25} {:<22} {}", m.model, m.label, m.provider);
    }

    println!();
    println!("Agents: {}", AgentKind::available().join(", "));
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultsView<'a> {
    /// Rows and errors of one run.
    Run(&'a str),
    /// Rows of the most recently written run.
    LastRun,
    /// Latest-run average per model and category.
    LatestPerModel,
}

/// Latest-run average per (model, category) over the whole store.
async fn latest_per_model(store: &dyn ResultStore) -> Result<Vec<Score>> {
    let records = store
        .get_results(None)
        .await
        .context("Failed to read results")?;
    Ok(aggregate(&records, AggregationPolicy::Latest))
}

async fn cmd_results(store: &dyn ResultStore, view: ResultsView<'_>) -> Result<()> {
    let (records, errors) = match view {
        ResultsView::LatestPerModel => {
            let scores = latest_per_model(store).await?;
            if scores.is_empty() {
                println!("No results found.");
            }
            for s in &scores {
                println!(
                    "{:<28} {:<20} {:<10} {:>6.1}%",
                    s.label,
                    s.category,
                    s.framework,
                    s.value * 100.0
                );
            }
            return Ok(());
        }
        ResultsView::Run(id) => {
            let run_id = RunId::from(id);
            let records = store.get_results(Some(&run_id)).await?;
            let errors = store.get_errors(Some(&run_id)).await?;
            (records, errors)
        }
        ResultsView::LastRun => (store.get_latest_results().await?, Vec::new()),
    };

    if records.is_empty() && errors.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for r in &records {
        println!(
            "{}  {:<28} {:<20} {:<10} {:>6.1}%  {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.label,
            r.category,
            r.framework,
            r.value * 100.0,
            r.run_id
        );
    }
    for e in &errors {
        println!(
            "{}  {:<28} {}  error: {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.label.as_deref().unwrap_or(&e.model),
            e.evaluation_path,
            e.error_message
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use fweval_state::fakes::MemoryResultStore;

    fn score(model: &str, label: &str, category: &str, value: f64) -> Score {
        Score {
            model: model.into(),
            label: label.into(),
            framework: "Next.js".into(),
            category: category.into(),
            value,
            updated_at: None,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "fweval", "run", "-e", "auth", "-e", "webhooks", "--mcp", "-d", "--timeout", "5000",
            "-m", "gpt",
        ])
        .unwrap();
        let Commands::Run {
            dispatch,
            model,
            max_tool_rounds,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(dispatch.eval, vec!["auth", "webhooks"]);
        assert_eq!(model.as_deref(), Some("gpt"));
        assert_eq!(max_tool_rounds, 10);
        let flags = dispatch.flags();
        assert!(flags.debug);
        assert_eq!(flags.mode, ExecutionMode::Mcp);
        assert_eq!(flags.timeout, Duration::from_millis(5000));
    }

    #[test]
    fn missing_agent_is_a_config_error() {
        let cli = Cli::try_parse_from(["fweval", "agent"]).unwrap();
        let Commands::Agent { agent, .. } = cli.command else {
            panic!("expected agent");
        };
        let err = parse_agent(agent.as_deref()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAgent { .. }));
        assert_eq!(err.to_string(), "Missing --agent. Available: claude-code, cursor");
    }

    #[test]
    fn unknown_agent_lists_the_available_ones() {
        let err = parse_agent(Some("copilot")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown agent \"copilot\". Available: claude-code, cursor"
        );
        assert_eq!(parse_agent(Some("claude-code")).unwrap(), AgentKind::ClaudeCode);
    }

    #[test]
    fn export_policy_parses() {
        let cli = Cli::try_parse_from(["fweval", "export", "--policy", "latest"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                policy: AggregationPolicy::Latest,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["fweval", "export", "--policy", "median"]).is_err());
    }

    #[tokio::test]
    async fn export_splits_baseline_and_mcp_rows() {
        let store = MemoryResultStore::new();
        let run = RunId::from("run-1");
        store
            .save_result(&run, &score("gpt-4o", "GPT-4o", "Auth", 0.5))
            .await
            .unwrap();
        store
            .save_result(&run, &score("gpt-4o", "GPT-4o", "Auth", 1.0))
            .await
            .unwrap();
        store
            .save_result(&RunId::from("run-mcp-1"), &score("gpt-4o", "GPT-4o (MCP)", "Auth", 0.75))
            .await
            .unwrap();

        let out = tempfile::tempdir().unwrap();
        cmd_export(&store, AggregationPolicy::Best, out.path()).await.unwrap();

        let baseline = read_scores_json(&out.path().join(SCORES_FILE)).unwrap();
        assert_eq!(baseline.len(), 1);
        assert_eq!(baseline[0].value, 1.0);
        let mcp = read_scores_json(&out.path().join(MCP_SCORES_FILE)).unwrap();
        assert_eq!(mcp.len(), 1);
        assert_eq!(mcp[0].label, "GPT-4o (MCP)");
    }

    #[test]
    fn merge_writes_enriched_rows() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = dir.path().join(SCORES_FILE);
        let mcp = dir.path().join(MCP_SCORES_FILE);
        let out = dir.path().join(MERGED_SCORES_FILE);
        write_json_atomic(&baseline, &[score("gpt-4o", "GPT-4o", "Auth", 0.5)]).unwrap();
        write_json_atomic(
            &mcp,
            &[
                score("gpt-4o", "GPT-4o (MCP)", "Auth", 0.75),
                score("claude-opus-4-5", "Claude Opus 4.5 (MCP)", "Billing", 1.0),
            ],
        )
        .unwrap();

        cmd_merge(&baseline, &mcp, &out).unwrap();

        let raw = std::fs::read_to_string(&out).unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["mcpScore"], 0.75);
        assert_eq!(rows[0]["improvement"], 0.25);
        assert_eq!(rows[1]["value"], 0.0);
        assert_eq!(rows[1]["label"], "Claude Opus 4.5");
        assert_eq!(rows[1]["provider"], "anthropic");
    }

    #[test]
    fn merge_tolerates_missing_mcp_file() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = dir.path().join(SCORES_FILE);
        let out = dir.path().join(MERGED_SCORES_FILE);
        write_json_atomic(&baseline, &[score("gpt-4o", "GPT-4o", "Auth", 0.5)]).unwrap();

        cmd_merge(&baseline, &dir.path().join("absent.json"), &out).unwrap();

        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("mcpScore").is_none());
    }

    #[test]
    fn list_fails_on_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_list(&dir.path().join("evals")).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn results_for_unknown_run_is_empty() {
        let store = MemoryResultStore::new();
        cmd_results(&store, ResultsView::Run("run-missing")).await.unwrap();
        cmd_results(&store, ResultsView::LastRun).await.unwrap();
        cmd_results(&store, ResultsView::LatestPerModel).await.unwrap();
    }

    #[tokio::test]
    async fn latest_view_averages_each_models_newest_run() {
        let store = MemoryResultStore::new();
        let old = RunId::from("run-old");
        let new = RunId::from("run-new");
        let claude = RunId::from("run-claude");
        let mut s = score("gpt-4o", "GPT-4o", "Auth", 0.0);
        s.updated_at = Some(chrono::Utc::now() - chrono::Duration::hours(2));
        store.save_result(&old, &s).await.unwrap();
        let mut s = score("gpt-4o", "GPT-4o", "Auth", 0.5);
        s.updated_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
        store.save_result(&new, &s).await.unwrap();
        s.value = 1.0;
        store.save_result(&new, &s).await.unwrap();
        let mut s = score("claude-opus-4-5", "Claude Opus 4.5", "Auth", 0.25);
        s.updated_at = Some(chrono::Utc::now() - chrono::Duration::hours(3));
        store.save_result(&claude, &s).await.unwrap();

        let mut scores = latest_per_model(&store).await.unwrap();
        scores.sort_by(|a, b| a.model.cmp(&b.model));
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].model, "claude-opus-4-5");
        assert_eq!(scores[0].value, 0.25);
        assert_eq!(scores[1].model, "gpt-4o");
        assert_eq!(scores[1].value, 0.75);
    }

    #[test]
    fn results_flags_pick_a_view() {
        let cli = Cli::try_parse_from(["fweval", "results", "--latest"]).unwrap();
        assert!(matches!(cli.command, Commands::Results { run: None, latest: true }));
        assert!(Cli::try_parse_from(["fweval", "results", "--run", "r", "--latest"]).is_err());
    }
}
