//! Cross-run aggregation and baseline/MCP merging.
//!
//! Two export policies exist and answer different questions:
//!
//! - [`AggregationPolicy::Best`]: the highest value ever recorded per
//!   (model, category, framework).
//! - [`AggregationPolicy::Latest`]: for each model, only rows from its most
//!   recent run, averaged per (model, category).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use fweval_state::{RunId, Score, ScoreRecord};
use serde::{Deserialize, Serialize};

use crate::domain::Provider;
use crate::providers::catalog::provider_for;

pub const MCP_LABEL_SUFFIX: &str = " (MCP)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    #[default]
    Best,
    Latest,
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregationPolicy::Best => "best",
            AggregationPolicy::Latest => "latest",
        })
    }
}

impl FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(AggregationPolicy::Best),
            "latest" => Ok(AggregationPolicy::Latest),
            other => Err(format!("unknown aggregation policy `{other}` (expected best or latest)")),
        }
    }
}

pub fn aggregate(records: &[ScoreRecord], policy: AggregationPolicy) -> Vec<Score> {
    match policy {
        AggregationPolicy::Best => best_per_key(records),
        AggregationPolicy::Latest => latest_run_average(records),
    }
}

fn is_mcp_label(label: &str) -> bool {
    label.contains(MCP_LABEL_SUFFIX.trim_start())
}

/// Highest value per (model, category, framework). Ties keep the newest row.
///
/// MCP and baseline rows are ranked separately, so an MCP score never
/// shadows the baseline of the same key.
pub fn best_per_key(records: &[ScoreRecord]) -> Vec<Score> {
    let mut best: BTreeMap<(bool, &str, &str, &str), &ScoreRecord> = BTreeMap::new();
    for r in records {
        let key = (
            is_mcp_label(&r.label),
            r.model.as_str(),
            r.category.as_str(),
            r.framework.as_str(),
        );
        match best.get(&key) {
            Some(current)
                if current.value > r.value
                    || (current.value == r.value && current.timestamp >= r.timestamp) => {}
            _ => {
                best.insert(key, r);
            }
        }
    }
    best.into_values().map(ScoreRecord::to_score).collect()
}

/// Average per (model, category) over each model's most recent run.
///
/// The most recent run of a model is the run of its newest row. Labels are
/// kept distinct, so MCP and baseline rows of one model never mix.
pub fn latest_run_average(records: &[ScoreRecord]) -> Vec<Score> {
    let mut latest: HashMap<(&str, &str), (&RunId, DateTime<Utc>)> = HashMap::new();
    for r in records {
        let key = (r.model.as_str(), r.label.as_str());
        match latest.get(&key) {
            Some((_, ts)) if *ts >= r.timestamp => {}
            _ => {
                latest.insert(key, (&r.run_id, r.timestamp));
            }
        }
    }

    struct Bucket<'a> {
        framework: &'a str,
        sum: f64,
        count: usize,
        newest: DateTime<Utc>,
    }

    let mut buckets: BTreeMap<(&str, &str, &str), Bucket> = BTreeMap::new();
    for r in records {
        let Some((run, _)) = latest.get(&(r.model.as_str(), r.label.as_str())) else {
            continue;
        };
        if *run != &r.run_id {
            continue;
        }
        let bucket = buckets
            .entry((r.model.as_str(), r.label.as_str(), r.category.as_str()))
            .or_insert(Bucket {
                framework: r.framework.as_str(),
                sum: 0.0,
                count: 0,
                newest: r.timestamp,
            });
        bucket.sum += r.value;
        bucket.count += 1;
        bucket.newest = bucket.newest.max(r.timestamp);
    }

    buckets
        .into_iter()
        .map(|((model, label, category), b)| Score {
            model: model.to_string(),
            label: label.to_string(),
            framework: b.framework.to_string(),
            category: category.to_string(),
            value: b.sum / b.count as f64,
            updated_at: Some(b.newest),
        })
        .collect()
}

/// Split into (baseline, tool-augmented) by the ` (MCP)` label suffix.
pub fn split_by_mode(scores: Vec<Score>) -> (Vec<Score>, Vec<Score>) {
    scores
        .into_iter()
        .partition(|s| !is_mcp_label(&s.label))
}

/// A baseline score enriched with its tool-augmented counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedScore {
    #[serde(flatten)]
    pub score: Score,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
}

/// Join baseline and MCP scores on (model, category, framework).
///
/// Baseline keys keep their order. Keys found only in `mcp` are appended
/// with a synthetic baseline `value` of 0 and the whole MCP value counted as
/// `improvement`; that 0 means "no baseline run", not a measured zero.
pub fn merge_scores(baseline: &[Score], mcp: &[Score]) -> Vec<MergedScore> {
    fn key(s: &Score) -> (String, String, String) {
        (s.model.clone(), s.category.clone(), s.framework.clone())
    }

    let mut mcp_by_key: BTreeMap<(String, String, String), &Score> = BTreeMap::new();
    for m in mcp {
        mcp_by_key.insert(key(m), m);
    }

    let mut merged = Vec::with_capacity(baseline.len() + mcp_by_key.len());
    for b in baseline {
        let mut entry = MergedScore {
            score: b.clone(),
            provider: provider_for(&b.model),
            mcp_score: None,
            improvement: None,
            tools_used: None,
        };
        if let Some(m) = mcp_by_key.remove(&key(b)) {
            entry.mcp_score = Some(m.value);
            entry.improvement = Some(m.value - b.value);
            entry.tools_used = Some(Vec::new());
        }
        merged.push(entry);
    }

    for m in mcp_by_key.into_values() {
        merged.push(MergedScore {
            score: Score {
                label: m.label.replace(MCP_LABEL_SUFFIX, ""),
                value: 0.0,
                ..m.clone()
            },
            provider: provider_for(&m.model),
            mcp_score: Some(m.value),
            improvement: Some(m.value),
            tools_used: Some(Vec::new()),
        });
    }
    merged
}
