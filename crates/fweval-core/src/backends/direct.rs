use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use super::{unsupported, ExecutionBackend, Generation, SYSTEM_PROMPT};
use crate::domain::{ExecError, Target, Task};
use crate::providers::ProviderRegistry;
use crate::rate_limiter::RateLimiter;

/// One non-interactive completion per task.
pub struct DirectBackend {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
}

impl DirectBackend {
    pub fn new(registry: Arc<ProviderRegistry>, limiter: Arc<RateLimiter>) -> Self {
        Self { registry, limiter }
    }
}

#[async_trait]
impl ExecutionBackend for DirectBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[instrument(skip(self, task, prompt), fields(task_target = %task.target, evaluation = %task.evaluation.path))]
    async fn execute(&self, task: &Task, prompt: &str) -> Result<Generation, ExecError> {
        let Target::Model(target) = &task.target else {
            return Err(unsupported(self.name(), &task.target));
        };
        let model = self.registry.resolve(target.provider, &target.model)?;
        self.limiter.acquire(target.provider).await;
        let response = model.complete(prompt, Some(SYSTEM_PROMPT)).await?;
        Ok(Generation::text(response))
    }
}
