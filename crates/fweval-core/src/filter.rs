//! Evaluation and model selection from `--eval` / `--model` arguments.

use crate::domain::{ConfigError, Evaluation, ModelTarget};
use crate::providers::CatalogModel;

/// Strip a leading `./` and make sure the value starts with `evals/`.
pub fn normalize_eval_path(value: &str) -> String {
    let mut value = value;
    while let Some(rest) = value.strip_prefix("./") {
        value = rest;
    }
    if value.starts_with("evals/") {
        value.to_string()
    } else {
        format!("evals/{value}")
    }
}

/// Exact path, path suffix, or case-insensitive category/path substring.
pub fn matches_filter(evaluation: &Evaluation, term: &str) -> bool {
    let normalized = normalize_eval_path(term);
    let lowered = term.to_lowercase();
    evaluation.path == normalized
        || evaluation.path.ends_with(&format!("/{normalized}"))
        || evaluation.path.ends_with(&format!("/{term}"))
        || evaluation.category.to_lowercase().contains(&lowered)
        || evaluation.path.to_lowercase().contains(&lowered)
}

/// Enabled evaluations matching any of `terms` (all of them when empty).
///
/// A non-empty filter that matches nothing is a configuration error listing
/// every available path.
pub fn select_evaluations(
    evaluations: Vec<Evaluation>,
    terms: &[String],
) -> Result<Vec<Evaluation>, ConfigError> {
    let enabled: Vec<Evaluation> = evaluations.into_iter().filter(|e| e.enabled).collect();
    if terms.is_empty() {
        return Ok(enabled);
    }
    let available: Vec<String> = enabled.iter().map(|e| e.path.clone()).collect();
    let selected: Vec<Evaluation> = enabled
        .into_iter()
        .filter(|e| terms.iter().any(|t| matches_filter(e, t)))
        .collect();
    if selected.is_empty() {
        return Err(ConfigError::NoMatchingEvaluation {
            filter: terms.join(", "),
            available,
        });
    }
    Ok(selected)
}

/// Catalog models whose id or label contains `filter`, case-insensitively.
pub fn select_models(
    models: &[CatalogModel],
    filter: Option<&str>,
) -> Result<Vec<ModelTarget>, ConfigError> {
    let Some(filter) = filter else {
        return Ok(models.iter().map(CatalogModel::target).collect());
    };
    let needle = filter.to_lowercase();
    let selected: Vec<ModelTarget> = models
        .iter()
        .filter(|m| {
            m.model.to_lowercase().contains(&needle) || m.label.to_lowercase().contains(&needle)
        })
        .map(CatalogModel::target)
        .collect();
    if selected.is_empty() {
        return Err(ConfigError::NoMatchingModel {
            filter: filter.to_string(),
            available: models.iter().map(|m| m.model.to_string()).collect(),
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provider;
    use std::path::PathBuf;

    fn eval(path: &str, category: &str) -> Evaluation {
        Evaluation::new(path, category, PathBuf::from(path))
    }

    fn catalog() -> Vec<Evaluation> {
        vec![
            eval("evals/auth/routes", "Auth"),
            eval("evals/billing/checkout-new", "Billing"),
            eval("evals/webhooks/users/receive", "Webhooks"),
        ]
    }

    #[test]
    fn normalizes_relative_forms() {
        assert_eq!(normalize_eval_path("./evals/auth/routes"), "evals/auth/routes");
        assert_eq!(normalize_eval_path("auth/routes"), "evals/auth/routes");
        assert_eq!(normalize_eval_path("././auth"), "evals/auth");
    }

    #[test]
    fn matches_exact_suffix_and_category() {
        let all = catalog();
        assert!(matches_filter(&all[0], "evals/auth/routes"));
        assert!(matches_filter(&all[2], "users/receive"));
        assert!(matches_filter(&all[1], "BILLING"));
        assert!(matches_filter(&all[1], "checkout"));
        assert!(!matches_filter(&all[0], "billing"));
    }

    #[test]
    fn multiple_terms_are_ored() {
        let selected = select_evaluations(catalog(), &["auth".into(), "webhooks".into()]).unwrap();
        let paths: Vec<_> = selected.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["evals/auth/routes", "evals/webhooks/users/receive"]);
    }

    #[test]
    fn zero_matches_lists_available_paths() {
        let err = select_evaluations(catalog(), &["organizations".into()]).unwrap_err();
        match err {
            ConfigError::NoMatchingEvaluation { filter, available } => {
                assert_eq!(filter, "organizations");
                assert_eq!(available.len(), 3);
                assert!(available.contains(&"evals/billing/checkout-new".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disabled_evaluations_are_never_selected() {
        let mut all = catalog();
        all[0].enabled = false;
        let selected = select_evaluations(all, &[]).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn model_filter_is_case_insensitive_substring() {
        let models = [
            CatalogModel {
                provider: Provider::OpenAi,
                model: "gpt-4o",
                label: "GPT-4o",
            },
            CatalogModel {
                provider: Provider::Anthropic,
                model: "claude-sonnet-4-5",
                label: "Claude Sonnet 4.5",
            },
        ];
        let selected = select_models(&models, Some("SONNET")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].model, "claude-sonnet-4-5");
        assert!(matches!(
            select_models(&models, Some("llama")),
            Err(ConfigError::NoMatchingModel { .. })
        ));
        assert_eq!(select_models(&models, None).unwrap().len(), 2);
    }
}
