//! SurrealDB schema migrations and initialization
//!
//! Both tables are append-only: rows may be created and read, never
//! updated or deleted.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize all fweval tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing fweval SurrealDB schema");

    init_results_table(db).await?;
    init_errors_table(db).await?;

    info!("fweval schema initialization complete");
    Ok(())
}

/// Initialize `results` table
///
/// Schema:
/// ```text
/// TABLE results {
///   seq:        INT (insertion order, indexed)
///   run_id:     STRING (indexed)
///   model:      STRING (indexed)
///   label:      STRING
///   framework:  STRING
///   category:   STRING
///   value:      FLOAT
///   timestamp:  DATETIME (indexed)
/// }
/// ```
async fn init_results_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing results table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS results
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_results_seq ON TABLE results COLUMNS seq;
        DEFINE INDEX IF NOT EXISTS idx_results_run_id ON TABLE results COLUMNS run_id;
        DEFINE INDEX IF NOT EXISTS idx_results_model ON TABLE results COLUMNS model;
        DEFINE INDEX IF NOT EXISTS idx_results_timestamp ON TABLE results COLUMNS timestamp;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StorageError::SchemaSetup(format!("results table: {e}")))?;

    Ok(())
}

/// Initialize `errors` table
///
/// Schema:
/// ```text
/// TABLE errors {
///   seq:              INT
///   run_id:           STRING (indexed)
///   model:            STRING
///   label:            STRING?
///   framework:        STRING?
///   category:         STRING?
///   evaluation_path:  STRING
///   error_message:    STRING
///   stack_trace:      STRING?
///   timestamp:        DATETIME
/// }
/// ```
async fn init_errors_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing errors table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS errors
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_errors_run_id ON TABLE errors COLUMNS run_id;
        DEFINE INDEX IF NOT EXISTS idx_errors_seq ON TABLE errors COLUMNS seq;
    "#;

    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StorageError::SchemaSetup(format!("errors table: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Seq {
        seq: u64,
    }

    #[tokio::test]
    async fn schema_applies_twice_on_fresh_database() {
        let db = surrealdb::engine::any::connect("mem://").await.unwrap();
        db.use_ns("fweval").use_db("migrations").await.unwrap();

        init_schema(&db).await.unwrap();
        init_schema(&db).await.unwrap();

        let mut res = db
            .query("CREATE results SET seq = 1, run_id = 'run-a'; SELECT seq FROM results")
            .await
            .unwrap()
            .check()
            .unwrap();
        let rows: Vec<Seq> = res.take(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].seq, 1);
    }
}
