//! Error types for fweval-state

use thiserror::Error;

/// Errors that can occur in the result persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Query or write rejected by the backend
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Row could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
