//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryResultStore` satisfies the `ResultStore` contract without any
//! external dependencies. Rows are kept in insertion order.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage_traits::*;

/// In-memory result store backed by two append-only `Vec`s.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: Mutex<Vec<ScoreRecord>>,
    errors: Mutex<Vec<ErrorRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of score rows appended so far.
    pub fn result_count(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    /// Number of error rows appended so far.
    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

/// Newest first by timestamp; equal timestamps keep reverse insertion order.
fn newest_first<T: Clone>(
    rows: &[T],
    keep: impl Fn(&T) -> bool,
    ts: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().filter(|r| keep(r)).cloned().collect();
    out.sort_by(|a, b| ts(b).cmp(&ts(a)));
    out
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn save_result(&self, run_id: &RunId, score: &Score) -> StorageResult<()> {
        let record = ScoreRecord::new(run_id, score);
        self.results.lock().unwrap().push(record);
        Ok(())
    }

    async fn save_error(&self, run_id: &RunId, details: ErrorDetails) -> StorageResult<()> {
        let record = ErrorRecord::new(run_id, details);
        self.errors.lock().unwrap().push(record);
        Ok(())
    }

    async fn get_results(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ScoreRecord>> {
        let rows = self.results.lock().unwrap();
        Ok(newest_first(
            &rows,
            |r| run_id.map_or(true, |id| &r.run_id == id),
            |r| r.timestamp,
        ))
    }

    async fn get_latest_results(&self) -> StorageResult<Vec<ScoreRecord>> {
        let last_run = {
            let rows = self.results.lock().unwrap();
            match rows.last() {
                Some(row) => row.run_id.clone(),
                None => return Ok(Vec::new()),
            }
        };
        self.get_results(Some(&last_run)).await
    }

    async fn get_errors(&self, run_id: Option<&RunId>) -> StorageResult<Vec<ErrorRecord>> {
        let rows = self.errors.lock().unwrap();
        Ok(newest_first(
            &rows,
            |r| run_id.map_or(true, |id| &r.run_id == id),
            |r| r.timestamp,
        ))
    }
}
