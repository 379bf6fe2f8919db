//! LLM-as-judge scoring.
//!
//! A judge grader sends one closed-question prompt (task, submission,
//! criterion) to a judge model and passes only on a full score of 1.
//! Judge call failures propagate; they never count as "not passed".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::GradeError;
use crate::graders::{Grade, Grader};
use crate::providers::catalog::provider_for;
use crate::providers::ProviderRegistry;
use crate::rate_limiter::RateLimiter;

/// Rubric for one judge grader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    pub criteria: String,
    /// Task text shown to the judge. Empty by default.
    pub input: String,
    /// Judge model override.
    pub model: Option<String>,
}

impl Rubric {
    pub fn new(criteria: impl Into<String>) -> Self {
        Self {
            criteria: criteria.into(),
            input: String::new(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }
}

impl From<&str> for Rubric {
    fn from(criteria: &str) -> Self {
        Rubric::new(criteria)
    }
}

impl From<String> for Rubric {
    fn from(criteria: String) -> Self {
        Rubric::new(criteria)
    }
}

/// External rubric evaluation: `judge(candidate, criteria, model) -> score`.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Returns a normalized score in `[0, 1]`.
    async fn score(&self, rubric: &Rubric, candidate: &str) -> Result<f64, GradeError>;
}

const CLOSED_QA_TEMPLATE: &str = "You are assessing a submitted answer on a given task based on a criterion. Here is the data:
[BEGIN DATA]
***
[Task]: {{input}}
***
[Submission]: {{output}}
***
[Criterion]: {{criteria}}
***
[END DATA]
Does the submission meet the criterion?

Reason step by step, then finish with a final line that is exactly `Answer: Y` or `Answer: N`.";

const CLOSED_QA_SYSTEM: &str =
    "You are a strict grader. Answer only on the evidence in the submission.";

/// Render the closed-question prompt.
pub fn closed_qa_prompt(rubric: &Rubric, candidate: &str) -> String {
    CLOSED_QA_TEMPLATE
        .replace("{{input}}", &rubric.input)
        .replace("{{criteria}}", &rubric.criteria)
        .replace("{{output}}", candidate)
}

/// Parse the judge verdict into a score: `Y` is 1, `N` is 0.
pub fn parse_verdict(reply: &str) -> Result<f64, GradeError> {
    let verdict = reply
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let decoration = |c: char| c == '`' || c == '*' || c == '.';
    let cleaned = verdict.trim_matches(decoration);
    let answer = cleaned
        .strip_prefix("Answer:")
        .unwrap_or(cleaned)
        .trim()
        .trim_matches(decoration);
    match answer.to_ascii_uppercase().as_str() {
        "Y" | "YES" => Ok(1.0),
        "N" | "NO" => Ok(0.0),
        _ => Err(GradeError::Verdict(verdict.to_string())),
    }
}

/// Closed-question judge backed by the provider registry.
pub struct ClosedQaJudge {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
    default_model: String,
}

impl ClosedQaJudge {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiter: Arc<RateLimiter>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            limiter,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl JudgeClient for ClosedQaJudge {
    async fn score(&self, rubric: &Rubric, candidate: &str) -> Result<f64, GradeError> {
        let model_id = rubric.model.as_deref().unwrap_or(&self.default_model);
        let provider = provider_for(model_id);
        let model = self.registry.resolve(provider, model_id)?;

        self.limiter.acquire(provider).await;
        let reply = model
            .complete(&closed_qa_prompt(rubric, candidate), Some(CLOSED_QA_SYSTEM))
            .await
            .map_err(GradeError::Judge)?;

        let score = parse_verdict(&reply)?;
        debug!(model = %model_id, score, "judge verdict");
        Ok(score)
    }
}

struct JudgeGrader {
    client: Arc<dyn JudgeClient>,
    rubric: Rubric,
}

#[async_trait]
impl Grade for JudgeGrader {
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        let score = self.client.score(&self.rubric, response).await?;
        Ok(score == 1.0)
    }

    fn validate(&self) -> Result<(), GradeError> {
        if self.rubric.criteria.trim().is_empty() {
            return Err(GradeError::EmptyRubric);
        }
        Ok(())
    }
}

/// Judge grader: passes iff the judge's score is exactly 1.
pub fn judge(client: Arc<dyn JudgeClient>, rubric: impl Into<Rubric>) -> Grader {
    Arc::new(JudgeGrader {
        client,
        rubric: rubric.into(),
    })
}

/// Build judge graders sharing one client, for reuse across evaluations.
pub fn register_judges<I, K, R>(client: Arc<dyn JudgeClient>, rubrics: I) -> HashMap<String, Grader>
where
    I: IntoIterator<Item = (K, R)>,
    K: Into<String>,
    R: Into<Rubric>,
{
    rubrics
        .into_iter()
        .map(|(name, rubric)| (name.into(), judge(Arc::clone(&client), rubric)))
        .collect()
}
