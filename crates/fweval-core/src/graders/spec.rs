//! Declarative grader sets (`graders.toml`) and shared judges (`judges.toml`).
//!
//! ```toml
//! [[grader]]
//! name = "import_package"
//! kind = "contains"
//! needle = "@clerk/nextjs/server"
//!
//! [[grader]]
//! name = "finalizes_checkout"
//! kind = "all_of"
//! of = [
//!   { kind = "contains", needle = "finalize" },
//!   { kind = "contains", needle = "redirectUrl" },
//! ]
//!
//! [[grader]]
//! name = "environment_variables"
//! kind = "judge_ref"
//! judge = "environment_variables"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::{
    all_of, any_of, contains_any, contains_with, matches_pattern, ContainsOptions, Grader,
    GraderSet,
};
use crate::domain::ConfigError;
use crate::judge::{judge, register_judges, JudgeClient, Rubric};

/// One grader definition. Nested inside `all_of` / `any_of` without a name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraderKind {
    Contains {
        needle: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    ContainsAny {
        needles: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    Matches {
        pattern: String,
    },
    AllOf {
        of: Vec<GraderKind>,
    },
    AnyOf {
        of: Vec<GraderKind>,
    },
    Judge {
        rubric: String,
        #[serde(default)]
        model: Option<String>,
    },
    /// Reference to a judge declared in the shared `judges.toml`.
    JudgeRef {
        judge: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedGrader {
    pub name: String,
    #[serde(flatten)]
    pub kind: GraderKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GradersFile {
    #[serde(default, rename = "grader")]
    pub graders: Vec<NamedGrader>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct JudgesFile {
    #[serde(default)]
    judges: BTreeMap<String, String>,
}

/// What building a grader from its definition needs.
#[derive(Clone)]
pub struct GraderContext {
    pub judge: Arc<dyn JudgeClient>,
    pub shared_judges: HashMap<String, Grader>,
}

impl GraderContext {
    pub fn new(judge: Arc<dyn JudgeClient>) -> Self {
        Self {
            judge,
            shared_judges: HashMap::new(),
        }
    }

    pub fn with_shared_judges(mut self, judges: HashMap<String, Grader>) -> Self {
        self.shared_judges = judges;
        self
    }
}

impl GraderKind {
    pub fn build(&self, name: &str, ctx: &GraderContext) -> Result<Grader, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidGrader {
            name: name.to_string(),
            reason,
        };
        Ok(match self {
            GraderKind::Contains {
                needle,
                case_sensitive,
            } => contains_with(
                needle,
                ContainsOptions {
                    case_sensitive: *case_sensitive,
                },
            ),
            GraderKind::ContainsAny {
                needles,
                case_sensitive,
            } => contains_any(
                needles,
                ContainsOptions {
                    case_sensitive: *case_sensitive,
                },
            ),
            GraderKind::Matches { pattern } => {
                matches_pattern(pattern).map_err(|e| invalid(e.to_string()))?
            }
            GraderKind::AllOf { of } => all_of(
                of.iter()
                    .map(|k| k.build(name, ctx))
                    .collect::<Result<_, _>>()?,
            ),
            GraderKind::AnyOf { of } => any_of(
                of.iter()
                    .map(|k| k.build(name, ctx))
                    .collect::<Result<_, _>>()?,
            ),
            GraderKind::Judge { rubric, model } => {
                let mut rubric = Rubric::new(rubric.as_str());
                if let Some(model) = model {
                    rubric = rubric.with_model(model.as_str());
                }
                judge(Arc::clone(&ctx.judge), rubric)
            }
            GraderKind::JudgeRef { judge } => ctx
                .shared_judges
                .get(judge)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownJudge {
                    name: judge.clone(),
                })?,
        })
    }
}

impl GradersFile {
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Catalog {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn build(&self, ctx: &GraderContext) -> Result<GraderSet, ConfigError> {
        let entries = self
            .graders
            .iter()
            .map(|g| g.kind.build(&g.name, ctx).map(|grader| (g.name.clone(), grader)))
            .collect::<Result<Vec<_>, _>>()?;
        GraderSet::new(entries)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Catalog {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Read and build one evaluation's `graders.toml`.
pub fn load_grader_set(path: &Path, ctx: &GraderContext) -> Result<GraderSet, ConfigError> {
    GradersFile::parse(&read(path)?, path)?.build(ctx)
}

/// Read the shared `judges.toml`. A missing file yields no judges.
pub fn load_shared_judges(
    path: &Path,
    client: Arc<dyn JudgeClient>,
) -> Result<HashMap<String, Grader>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file: JudgesFile = toml::from_str(&read(path)?).map_err(|e| ConfigError::Catalog {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(register_judges(client, file.judges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GradeError;
    use crate::graders::compute_score;
    use crate::judge::Rubric;
    use async_trait::async_trait;

    /// Passes when the candidate mentions the first word of the rubric.
    struct KeywordJudge;

    #[async_trait]
    impl JudgeClient for KeywordJudge {
        async fn score(&self, rubric: &Rubric, candidate: &str) -> Result<f64, GradeError> {
            let word = rubric.criteria.split_whitespace().next().unwrap_or_default();
            Ok(if candidate.contains(word) { 1.0 } else { 0.0 })
        }
    }

    fn ctx() -> GraderContext {
        let judge: Arc<dyn JudgeClient> = Arc::new(KeywordJudge);
        let shared = register_judges(Arc::clone(&judge), [("env", "CLERK_SECRET_KEY present?")]);
        GraderContext::new(judge).with_shared_judges(shared)
    }

    const SAMPLE: &str = r#"
[[grader]]
name = "import_package"
kind = "contains"
needle = "@clerk/nextjs/server"

[[grader]]
name = "route"
kind = "contains_any"
needles = ["app/api/webhooks/route.ts", "pages/api/webhooks.ts"]

[[grader]]
name = "starts_checkout"
kind = "any_of"
of = [
  { kind = "matches", pattern = 'checkout\.start\s*\(' },
  { kind = "matches", pattern = '\.start\(\)' },
]

[[grader]]
name = "finalizes"
kind = "all_of"
of = [
  { kind = "contains", needle = "finalize" },
  { kind = "contains", needle = "redirectUrl", case_sensitive = true },
]

[[grader]]
name = "env"
kind = "judge_ref"
judge = "env"

[[grader]]
name = "auth_call"
kind = "judge"
rubric = "auth() is awaited"
model = "claude-sonnet-4-5"
"#;

    #[test]
    fn parses_every_kind_in_order() {
        let file = GradersFile::parse(SAMPLE, Path::new("graders.toml")).unwrap();
        let names: Vec<_> = file.graders.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(
            names,
            ["import_package", "route", "starts_checkout", "finalizes", "env", "auth_call"]
        );
        assert_eq!(
            file.graders[5].kind,
            GraderKind::Judge {
                rubric: "auth() is awaited".into(),
                model: Some("claude-sonnet-4-5".into())
            }
        );
    }

    #[tokio::test]
    async fn built_set_scores_a_response() {
        let set = GradersFile::parse(SAMPLE, Path::new("graders.toml"))
            .unwrap()
            .build(&ctx())
            .unwrap();
        assert_eq!(set.len(), 6);

        let response = "import { auth } from '@clerk/nextjs/server'\n\
                        // pages/api/webhooks.ts\n\
                        await checkout.start()\n\
                        CLERK_SECRET_KEY=...";
        let outcomes = set.grade(response).await.unwrap();
        let passed: Vec<_> = outcomes.iter().filter(|o| o.passed).map(|o| o.name.as_str()).collect();
        assert_eq!(passed, ["import_package", "route", "starts_checkout", "env"]);
        assert!((compute_score(&outcomes) - 4.0 / 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_judge_ref_is_a_config_error() {
        let raw = "[[grader]]\nname = \"x\"\nkind = \"judge_ref\"\njudge = \"missing\"\n";
        let err = GradersFile::parse(raw, Path::new("g.toml"))
            .unwrap()
            .build(&ctx())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownJudge { name } if name == "missing"));
    }

    #[test]
    fn empty_needle_and_bad_regex_are_rejected() {
        let raw = "[[grader]]\nname = \"x\"\nkind = \"contains\"\nneedle = \"\"\n";
        let err = GradersFile::parse(raw, Path::new("g.toml"))
            .unwrap()
            .build(&ctx())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidGrader { .. }));

        let raw = "[[grader]]\nname = \"y\"\nkind = \"matches\"\npattern = \"(\"\n";
        let err = GradersFile::parse(raw, Path::new("g.toml"))
            .unwrap()
            .build(&ctx())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidGrader { name, .. } if name == "y"));
    }

    #[test]
    fn empty_file_is_an_empty_set_error() {
        let err = GradersFile::parse("", Path::new("g.toml"))
            .unwrap()
            .build(&ctx())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::EmptyGraderSet));
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let raw = "[[grader]]\nname = \"x\"\nkind = \"fuzzy\"\n";
        assert!(matches!(
            GradersFile::parse(raw, Path::new("g.toml")),
            Err(ConfigError::Catalog { .. })
        ));
    }

    #[test]
    fn shared_judges_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let judges = load_shared_judges(&dir.path().join("judges.toml"), Arc::new(KeywordJudge)).unwrap();
        assert!(judges.is_empty());

        let path = dir.path().join("judges.toml");
        std::fs::write(&path, "[judges]\nenv = \"Has CLERK_SECRET_KEY?\"\n").unwrap();
        let judges = load_shared_judges(&path, Arc::new(KeywordJudge)).unwrap();
        assert!(judges.contains_key("env"));
    }
}
