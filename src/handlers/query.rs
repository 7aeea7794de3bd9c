//! Query execution against a registered connection.
//!
//! The SQL is sent as written. Nothing here inspects or restricts it.

use crate::db::{PoolRegistry, QueryExecutor};
use crate::error::DbResult;
use crate::models::QueryResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Handler for raw query execution.
pub struct QueryHandler {
    registry: Arc<PoolRegistry>,
    executor: QueryExecutor,
}

impl QueryHandler {
    pub fn new(registry: Arc<PoolRegistry>, executor: QueryExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Run `sql` on `database` (connection default when None) and return the
    /// last statement's result.
    pub async fn execute(
        &self,
        connection_id: &str,
        sql: &str,
        database: Option<&str>,
    ) -> DbResult<QueryResult> {
        let start = Instant::now();
        let pool = self.registry.get(connection_id, database).await?;
        let result = self.executor.execute(&pool, sql, None).await?;

        info!(
            connection_id = %connection_id,
            database = ?database,
            row_count = result.row_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(result)
    }
}
