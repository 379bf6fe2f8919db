//! fweval-state: durable score and error log for fweval
//!
//! This crate owns all I/O against the result store. Every evaluation task
//! ends in exactly one appended row: a score in `results` or a failure in
//! `errors`. Rows are never updated in place.
//!
//! ## Key Components
//!
//! - `ResultStore`: async trait every backend implements
//! - `SurrealResultStore`: SurrealDB implementation (`mem://`, `surrealkv://`, `ws://`)
//! - `fakes::MemoryResultStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::StorageError;
pub use handle::StoreConfig;
pub use schema::{ErrorRow, ResultRow};
pub use storage_traits::{
    ErrorDetails, ErrorRecord, ResultStore, RunId, Score, ScoreRecord, StorageResult,
};
pub use surreal_store::SurrealResultStore;
