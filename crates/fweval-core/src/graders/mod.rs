//! Grader composition library.
//!
//! A [`Grader`] is an async `(response) -> bool` check. Deterministic graders
//! (substring, regex) and judge graders share the [`Grade`] trait so they can
//! be mixed freely inside one [`GraderSet`].

pub mod spec;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::domain::{ConfigError, GradeError, GraderOutcome};

pub use spec::{
    load_grader_set, load_shared_judges, GraderContext, GraderKind, GradersFile, NamedGrader,
};

/// A boolean check run against a candidate response.
#[async_trait]
pub trait Grade: Send + Sync {
    async fn grade(&self, response: &str) -> Result<bool, GradeError>;

    /// Construction-time check, run when the grader joins a [`GraderSet`].
    fn validate(&self) -> Result<(), GradeError> {
        Ok(())
    }
}

pub type Grader = Arc<dyn Grade>;

// ---------------------------------------------------------------------------
// Atomic graders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainsOptions {
    pub case_sensitive: bool,
}

#[derive(Debug, Clone)]
struct Contains {
    needle: String,
    case_sensitive: bool,
}

impl Contains {
    fn new(needle: &str, opts: ContainsOptions) -> Self {
        let needle = if opts.case_sensitive {
            needle.to_string()
        } else {
            needle.to_lowercase()
        };
        Self {
            needle,
            case_sensitive: opts.case_sensitive,
        }
    }

    fn check(&self, response: &str) -> bool {
        if self.case_sensitive {
            response.contains(&self.needle)
        } else {
            response.to_lowercase().contains(&self.needle)
        }
    }
}

#[async_trait]
impl Grade for Contains {
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        Ok(self.check(response))
    }

    fn validate(&self) -> Result<(), GradeError> {
        if self.needle.is_empty() {
            return Err(GradeError::EmptyNeedle);
        }
        Ok(())
    }
}

/// True iff `needle` occurs in the response, ignoring case.
pub fn contains(needle: &str) -> Grader {
    contains_with(needle, ContainsOptions::default())
}

pub fn contains_with(needle: &str, opts: ContainsOptions) -> Grader {
    Arc::new(Contains::new(needle, opts))
}

struct ContainsAny {
    needles: Vec<Contains>,
}

#[async_trait]
impl Grade for ContainsAny {
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        Ok(self.needles.iter().any(|n| n.check(response)))
    }

    fn validate(&self) -> Result<(), GradeError> {
        if self.needles.is_empty() {
            return Err(GradeError::EmptyNeedle);
        }
        self.needles.iter().try_for_each(|n| n.validate())
    }
}

/// True iff at least one needle passes [`contains_with`]. Stops at the first hit.
pub fn contains_any<S: AsRef<str>>(needles: &[S], opts: ContainsOptions) -> Grader {
    Arc::new(ContainsAny {
        needles: needles
            .iter()
            .map(|n| Contains::new(n.as_ref(), opts))
            .collect(),
    })
}

struct Matches {
    re: Regex,
}

#[async_trait]
impl Grade for Matches {
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        Ok(self.re.is_match(response))
    }
}

/// True iff `re` matches anywhere in the response. Anchors only if the pattern has them.
pub fn matches(re: Regex) -> Grader {
    Arc::new(Matches { re })
}

/// Compile `pattern` and wrap it with [`matches`].
pub fn matches_pattern(pattern: &str) -> Result<Grader, GradeError> {
    Ok(matches(Regex::new(pattern)?))
}

struct Predicate<F> {
    check: F,
}

#[async_trait]
impl<F> Grade for Predicate<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        Ok((self.check)(response))
    }
}

/// Wrap a synchronous check as a grader.
pub fn predicate<F>(check: F) -> Grader
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    Arc::new(Predicate { check })
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

struct AllOf {
    parts: Vec<Grader>,
}

#[async_trait]
impl Grade for AllOf {
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        for part in &self.parts {
            if !part.grade(response).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn validate(&self) -> Result<(), GradeError> {
        self.parts.iter().try_for_each(|p| p.validate())
    }
}

struct AnyOf {
    parts: Vec<Grader>,
}

#[async_trait]
impl Grade for AnyOf {
    async fn grade(&self, response: &str) -> Result<bool, GradeError> {
        for part in &self.parts {
            if part.grade(response).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn validate(&self) -> Result<(), GradeError> {
        self.parts.iter().try_for_each(|p| p.validate())
    }
}

/// Passes iff every part passes. Evaluated left to right, stopping at the first failure.
pub fn all_of(parts: Vec<Grader>) -> Grader {
    Arc::new(AllOf { parts })
}

/// Passes iff any part passes. Evaluated left to right, stopping at the first pass.
pub fn any_of(parts: Vec<Grader>) -> Grader {
    Arc::new(AnyOf { parts })
}

pub fn and(a: Grader, b: Grader) -> Grader {
    all_of(vec![a, b])
}

pub fn or(a: Grader, b: Grader) -> Grader {
    any_of(vec![a, b])
}

// ---------------------------------------------------------------------------
// GraderSet
// ---------------------------------------------------------------------------

/// Ordered, uniquely named graders belonging to one evaluation.
///
/// Order does not affect the score; it is kept for report readability.
#[derive(Clone)]
pub struct GraderSet {
    entries: Vec<(String, Grader)>,
}

impl GraderSet {
    /// Build a set, rejecting empty sets, duplicate names, and invalid graders.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, Grader)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (name, grader) in entries {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateGrader { name });
            }
            grader.validate().map_err(|e| ConfigError::InvalidGrader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            out.push((name, grader));
        }
        if out.is_empty() {
            return Err(ConfigError::EmptyGraderSet);
        }
        Ok(Self { entries: out })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Run every grader against `response`, in order.
    ///
    /// The first grader error aborts grading: a score is only produced when
    /// all graders actually ran.
    pub async fn grade(&self, response: &str) -> Result<Vec<GraderOutcome>, GradeError> {
        let mut outcomes = Vec::with_capacity(self.entries.len());
        for (name, grader) in &self.entries {
            let passed = grader
                .grade(response)
                .await
                .map_err(|e| GradeError::Named {
                    name: name.clone(),
                    source: Box::new(e),
                })?;
            outcomes.push(GraderOutcome {
                name: name.clone(),
                passed,
            });
        }
        Ok(outcomes)
    }
}

impl fmt::Debug for GraderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Fix the shape of a grader-set literal. Same as [`GraderSet::new`].
pub fn define_graders<I, S>(entries: I) -> Result<GraderSet, ConfigError>
where
    I: IntoIterator<Item = (S, Grader)>,
    S: Into<String>,
{
    GraderSet::new(entries)
}

/// Fraction of passing graders. An empty slice scores `0.0`.
pub fn compute_score(outcomes: &[GraderOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let passed = outcomes.iter().filter(|o| o.passed).count();
    passed as f64 / outcomes.len() as f64
}
