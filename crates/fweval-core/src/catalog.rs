//! Discovery of evaluations from the definition tree.
//!
//! A directory is an evaluation when it holds both `PROMPT.md` and
//! `graders.toml`; an optional `config.json` overrides the derived metadata.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::domain::{ConfigError, Evaluation, DEFAULT_FRAMEWORK};
use crate::graders::{load_grader_set, GraderContext, GraderSet};

pub const DEFAULT_EVALS_DIR: &str = "evals";
pub const PROMPT_FILE: &str = "PROMPT.md";
pub const GRADERS_FILE: &str = "graders.toml";
pub const CONFIG_FILE: &str = "config.json";
pub const JUDGES_FILE: &str = "judges.toml";

#[derive(Debug, Default, Deserialize)]
struct EvaluationConfig {
    framework: Option<String>,
    category: Option<String>,
    name: Option<String>,
    enabled: Option<bool>,
}

/// An evaluation with its grader set built.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub evaluation: Arc<Evaluation>,
    pub graders: Arc<GraderSet>,
}

/// `"001-user_management"` becomes `"User Management"`.
pub fn title_case(value: &str) -> String {
    let digits = value.chars().take_while(char::is_ascii_digit).count();
    let trimmed = if digits > 0 && value[digits..].starts_with('-') {
        &value[digits + 1..]
    } else {
        value
    };
    trimmed
        .split(['/', '_', '-'])
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn derive_category(relative: &str) -> String {
    match relative.split('/').next() {
        Some(first) if !first.is_empty() => title_case(first),
        _ => "General".to_string(),
    }
}

fn derive_name(relative: &str) -> String {
    match relative.split('/').filter(|s| !s.is_empty()).last() {
        Some(last) => title_case(last),
        None => title_case(relative),
    }
}

fn catalog_error(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::Catalog {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn is_evaluation_dir(dir: &Path) -> bool {
    dir.join(PROMPT_FILE).is_file() && dir.join(GRADERS_FILE).is_file()
}

fn read_config(dir: &Path) -> Result<EvaluationConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(EvaluationConfig::default());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| catalog_error(&path, e))?;
    serde_json::from_str(&raw).map_err(|e| catalog_error(&path, format!("failed to parse: {e}")))
}

fn walk(root: &Path, current: &Path, out: &mut Vec<Evaluation>) -> Result<(), ConfigError> {
    if is_evaluation_dir(current) {
        let relative = current
            .strip_prefix(root)
            .map_err(|e| catalog_error(current, e))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        // The root itself is never an evaluation.
        if relative.is_empty() {
            return Ok(());
        }
        let config = read_config(current)?;
        let mut evaluation = Evaluation::new(
            format!("{DEFAULT_EVALS_DIR}/{relative}"),
            config.category.unwrap_or_else(|| derive_category(&relative)),
            current.to_path_buf(),
        )
        .with_framework(config.framework.unwrap_or_else(|| DEFAULT_FRAMEWORK.to_string()))
        .with_name(config.name.unwrap_or_else(|| derive_name(&relative)));
        evaluation.enabled = config.enabled.unwrap_or(true);
        out.push(evaluation);
        return Ok(());
    }

    let entries = std::fs::read_dir(current).map_err(|e| catalog_error(current, e))?;
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| catalog_error(current, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    for dir in dirs {
        walk(root, &dir, out)?;
    }
    Ok(())
}

/// Every evaluation under `root`, disabled ones included, sorted by path.
pub fn discover(root: &Path) -> Result<Vec<Evaluation>, ConfigError> {
    if !root.is_dir() {
        return Err(catalog_error(root, "evaluation directory not found"));
    }
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = out.len(), root = %root.display(), "discovered evaluations");
    Ok(out)
}

/// Build the grader set of each evaluation.
pub fn load_entries(
    evaluations: Vec<Evaluation>,
    ctx: &GraderContext,
) -> Result<Vec<CatalogEntry>, ConfigError> {
    evaluations
        .into_iter()
        .map(|evaluation| {
            let graders = load_grader_set(&evaluation.graders_path(), ctx)?;
            Ok(CatalogEntry {
                evaluation: Arc::new(evaluation),
                graders: Arc::new(graders),
            })
        })
        .collect()
}
