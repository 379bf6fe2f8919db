//! Process-wide collaborators, built once and passed down explicitly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fweval_state::ResultStore;

use crate::backends::{AgentBackend, DirectBackend, McpBackend};
use crate::catalog::JUDGES_FILE;
use crate::config::HarnessConfig;
use crate::domain::ConfigError;
use crate::graders::{load_shared_judges, GraderContext};
use crate::judge::{ClosedQaJudge, JudgeClient};
use crate::mcp::{HttpConnector, SessionConnector};
use crate::providers::ProviderRegistry;
use crate::rate_limiter::RateLimiter;

/// Shared state for one fweval invocation.
///
/// Holds the provider registry, the per-provider rate limiter, the judge and
/// the result store; backends are built from it so every external call goes
/// through the same limiter.
#[derive(Clone)]
pub struct EvalContext {
    pub config: HarnessConfig,
    pub providers: Arc<ProviderRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub judge: Arc<dyn JudgeClient>,
    pub store: Arc<dyn ResultStore>,
    pub connector: Arc<dyn SessionConnector>,
}

impl EvalContext {
    pub fn new(config: HarnessConfig, store: Arc<dyn ResultStore>) -> Self {
        let http = reqwest::Client::new();
        let providers = Arc::new(ProviderRegistry::from_config(&config, http.clone()));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
        let judge: Arc<dyn JudgeClient> = Arc::new(ClosedQaJudge::new(
            Arc::clone(&providers),
            Arc::clone(&limiter),
            config.judge_model.clone(),
        ));
        Self {
            config,
            providers,
            limiter,
            judge,
            store,
            connector: Arc::new(HttpConnector::new(http)),
        }
    }

    /// Swap the registry. Also rebuilds the default judge, so call before
    /// [`EvalContext::with_judge`].
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Arc::new(providers);
        self.judge = Arc::new(ClosedQaJudge::new(
            Arc::clone(&self.providers),
            Arc::clone(&self.limiter),
            self.config.judge_model.clone(),
        ));
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn JudgeClient>) -> Self {
        self.judge = judge;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Judge plus the shared judges declared in `<evals_root>/judges.toml`.
    pub fn grader_context(&self, evals_root: &Path) -> Result<GraderContext, ConfigError> {
        let shared = load_shared_judges(&evals_root.join(JUDGES_FILE), Arc::clone(&self.judge))?;
        Ok(GraderContext::new(Arc::clone(&self.judge)).with_shared_judges(shared))
    }

    pub fn direct_backend(&self) -> DirectBackend {
        DirectBackend::new(Arc::clone(&self.providers), Arc::clone(&self.limiter))
    }

    pub fn mcp_backend(&self, max_tool_rounds: usize) -> McpBackend {
        McpBackend::new(
            Arc::clone(&self.providers),
            Arc::clone(&self.limiter),
            Arc::clone(&self.connector),
            self.config.mcp_server_url.clone(),
        )
        .with_max_tool_rounds(max_tool_rounds)
    }

    pub fn agent_backend(&self, work_root: impl Into<PathBuf>) -> AgentBackend {
        AgentBackend::new(work_root).with_mcp_server(self.config.mcp_server_url.clone())
    }
}
