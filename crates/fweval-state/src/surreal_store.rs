//! SurrealDB-backed ResultStore implementation
//!
//! Uses `schema::ResultRow` and `schema::ErrorRow` for persistence,
//! converting to/from `storage_traits` types at the boundary.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle::StoreConfig;
use crate::migrations;
use crate::schema::{ErrorRow, ResultRow};
use crate::storage_traits::{
    ErrorDetails, ErrorRecord, ResultStore, RunId, Score, ScoreRecord, StorageResult,
};

#[derive(Debug, Deserialize)]
struct SeqRow {
    seq: u64,
}

#[derive(Debug, Deserialize)]
struct LastRunRow {
    run_id: String,
}

/// SurrealDB-backed implementation of [`ResultStore`].
///
/// Row identity is assigned by SurrealDB. Insertion order is tracked with a
/// per-table sequence counter resumed from the stored maximum on
/// [`ResultStore::initialize`].
///
/// The counters live in this process, so a database must have a single
/// writing process at a time. Two `fweval` processes appending to the same
/// remote endpoint can hand out the same `seq`, after which
/// [`ResultStore::get_latest_results`] may pick either run.
pub struct SurrealResultStore {
    db: Surreal<Any>,
    result_seq: AtomicU64,
    error_seq: AtomicU64,
}

impl SurrealResultStore {
    /// Connect using `config` and run `initialize`.
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        let db = config.connect().await?;
        let store = Self {
            db,
            result_seq: AtomicU64::new(0),
            error_seq: AtomicU64::new(0),
        };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        let store = Self::connect(&StoreConfig::in_memory()).await?;
        info!("SurrealResultStore connected (in-memory)");
        Ok(store)
    }

    /// Create from environment variables. See [`StoreConfig::from_env`].
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(&StoreConfig::from_env()).await
    }

    // -- private helpers -----------------------------------------------------

    async fn max_seq(&self, table: &str) -> StorageResult<u64> {
        let sql = format!("SELECT seq FROM {table} ORDER BY seq DESC LIMIT 1");
        let mut res = self.db.query(sql).await?;
        let rows: Vec<SeqRow> = res.take(0)?;
        Ok(rows.first().map(|r| r.seq).unwrap_or(0))
    }

    async fn select_results(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ResultRow>> {
        let rows: Vec<ResultRow> = if let Some(run_id) = run_id {
            let rid = run_id.0.clone();
            let mut res = self
                .db
                .query("SELECT * FROM results WHERE run_id = $rid ORDER BY timestamp DESC, seq DESC")
                .bind(("rid", rid))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM results ORDER BY timestamp DESC, seq DESC")
                .await?;
            res.take(0)?
        };
        Ok(rows)
    }
}

#[async_trait]
impl ResultStore for SurrealResultStore {
    async fn initialize(&self) -> StorageResult<()> {
        migrations::init_schema(&self.db).await?;

        let results = self.max_seq("results").await?;
        let errors = self.max_seq("errors").await?;
        self.result_seq.fetch_max(results, Ordering::SeqCst);
        self.error_seq.fetch_max(errors, Ordering::SeqCst);

        debug!(results, errors, "result store sequences resumed");
        Ok(())
    }

    async fn save_result(&self, run_id: &RunId, score: &Score) -> StorageResult<()> {
        let seq = self.result_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let row = ResultRow::from_record(seq, ScoreRecord::new(run_id, score));

        debug!(run_id = %run_id, seq, model = %row.model, "appending result");

        let _created: Option<ResultRow> = self
            .db
            .create("results")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn save_error(&self, run_id: &RunId, details: ErrorDetails) -> StorageResult<()> {
        let seq = self.error_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let row = ErrorRow::from_record(seq, ErrorRecord::new(run_id, details));

        debug!(run_id = %run_id, seq, model = %row.model, "appending error");

        let _created: Option<ErrorRow> = self
            .db
            .create("errors")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_results(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ScoreRecord>> {
        let rows = self.select_results(run_id).await?;
        Ok(rows.into_iter().map(ResultRow::into_record).collect())
    }

    async fn get_latest_results(&self) -> StorageResult<Vec<ScoreRecord>> {
        let mut res = self
            .db
            .query("SELECT run_id, seq FROM results ORDER BY seq DESC LIMIT 1")
            .await?;
        let last: Vec<LastRunRow> = res.take(0)?;

        match last.into_iter().next() {
            Some(row) => self.get_results(Some(&RunId(row.run_id))).await,
            None => Ok(Vec::new()),
        }
    }

    async fn get_errors(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ErrorRecord>> {
        let rows: Vec<ErrorRow> = if let Some(run_id) = run_id {
            let rid = run_id.0.clone();
            let mut res = self
                .db
                .query("SELECT * FROM errors WHERE run_id = $rid ORDER BY timestamp DESC, seq DESC")
                .bind(("rid", rid))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM errors ORDER BY timestamp DESC, seq DESC")
                .await?;
            res.take(0)?
        };
        Ok(rows.into_iter().map(ErrorRow::into_record).collect())
    }
}
