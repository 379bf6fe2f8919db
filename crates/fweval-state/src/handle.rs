//! Connection configuration for the result store
//!
//! Supports embedded (`mem://`, `surrealkv://`) and remote (`ws://`, `wss://`)
//! SurrealDB endpoints.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::info;

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Default local persistence directory.
pub const DEFAULT_DB_PATH: &str = ".fweval/db";

/// Credentials for a remote SurrealDB endpoint
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

/// Configuration for connecting a result store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint URL (e.g. "mem://", "surrealkv://.fweval/db", "wss://...")
    pub url: String,
    /// Namespace (default: "fweval")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    pub credentials: Option<Credentials>,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: "fweval".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }

    /// In-memory store, lost when the process exits.
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - FWEVAL_DB_URL (optional, default: "surrealkv://.fweval/db")
    /// - SURREALDB_NAMESPACE (optional, default: "fweval")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_USERNAME / SURREALDB_PASSWORD (optional, both or neither)
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> Self {
        let url = std::env::var("FWEVAL_DB_URL")
            .unwrap_or_else(|_| format!("surrealkv://{DEFAULT_DB_PATH}"));
        let namespace =
            std::env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "fweval".to_string());
        let database = std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "main".to_string());

        let credentials = match (
            std::env::var("SURREALDB_USERNAME"),
            std::env::var("SURREALDB_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(Credentials {
                username,
                password,
                is_root: std::env::var("SURREALDB_ROOT")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false),
            }),
            _ => None,
        };

        Self {
            url,
            namespace,
            database,
            credentials,
        }
    }

    /// Open a connection, sign in if configured, and select ns/db.
    pub(crate) async fn connect(&self) -> StorageResult<Surreal<Any>> {
        if let Some(path) = self.url.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(self.url.as_str())
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to connect to {}: {}", self.url, e))
            })?;

        if let Some(creds) = &self.credentials {
            if creds.is_root {
                db.signin(Root {
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Connection(format!("Root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &self.namespace,
                    database: &self.database,
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Connection(format!("DB auth failed: {e}")))?;
            }
        }

        db.use_ns(&self.namespace)
            .use_db(&self.database)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(url = %self.url, ns = %self.namespace, db = %self.database, "result store connected");
        Ok(db)
    }
}
