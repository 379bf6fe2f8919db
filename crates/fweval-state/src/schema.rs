//! SurrealDB row types for the `results` and `errors` tables
//!
//! Conversion to and from the backend-agnostic records in
//! `storage_traits` happens at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{ErrorRecord, RunId, ScoreRecord};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row in the `results` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Insertion sequence, assigned by the store
    pub seq: u64,
    pub run_id: String,
    pub model: String,
    pub label: String,
    pub framework: String,
    pub category: String,
    pub value: f64,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl ResultRow {
    pub fn from_record(seq: u64, record: ScoreRecord) -> Self {
        Self {
            id: None,
            seq,
            run_id: record.run_id.0,
            model: record.model,
            label: record.label,
            framework: record.framework,
            category: record.category,
            value: record.value,
            timestamp: record.timestamp,
        }
    }

    pub fn into_record(self) -> ScoreRecord {
        ScoreRecord {
            run_id: RunId(self.run_id),
            model: self.model,
            label: self.label,
            framework: self.framework,
            category: self.category,
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}

/// Row in the `errors` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub seq: u64,
    pub run_id: String,
    pub model: String,
    pub label: Option<String>,
    pub framework: Option<String>,
    pub category: Option<String>,
    pub evaluation_path: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl ErrorRow {
    pub fn from_record(seq: u64, record: ErrorRecord) -> Self {
        Self {
            id: None,
            seq,
            run_id: record.run_id.0,
            model: record.model,
            label: record.label,
            framework: record.framework,
            category: record.category,
            evaluation_path: record.evaluation_path,
            error_message: record.error_message,
            stack_trace: record.stack_trace,
            timestamp: record.timestamp,
        }
    }

    pub fn into_record(self) -> ErrorRecord {
        ErrorRecord {
            run_id: RunId(self.run_id),
            model: self.model,
            label: self.label,
            framework: self.framework,
            category: self.category,
            evaluation_path: self.evaluation_path,
            error_message: self.error_message,
            stack_trace: self.stack_trace,
            timestamp: self.timestamp,
        }
    }
}
