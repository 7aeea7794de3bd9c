//! Single-row updates addressed by primary key.

use crate::db::{Catalog, PoolRegistry, QueryExecutor};
use crate::error::DbResult;
use crate::models::{QueryParam, RowUpdate, RowUpdateOutcome};
use std::sync::Arc;
use tracing::{debug, info};

/// Handler for row updates.
pub struct RowUpdateHandler {
    registry: Arc<PoolRegistry>,
    executor: QueryExecutor,
}

impl RowUpdateHandler {
    pub fn new(registry: Arc<PoolRegistry>, executor: QueryExecutor) -> Self {
        Self { registry, executor }
    }

    /// Update one row. An empty `updates` map returns
    /// [`RowUpdateOutcome::NoOp`] without touching the connection.
    ///
    /// Every value, the primary key included, is a bound parameter. On
    /// Postgres each placeholder is cast to its column's declared type.
    pub async fn update_row(
        &self,
        connection_id: &str,
        request: &RowUpdate,
    ) -> DbResult<RowUpdateOutcome> {
        if request.updates.is_empty() {
            debug!(connection_id = %connection_id, table = %request.table, "Nothing to update");
            return Ok(RowUpdateOutcome::NoOp);
        }
        request.validate()?;

        let pool = self
            .registry
            .get(connection_id, request.database.as_deref())
            .await?;
        let dialect = pool.dialect();
        let schema = request.schema.as_deref().or(dialect.default_schema());

        let column_types = Catalog::column_types(&pool, schema, &request.table).await?;
        let columns: Vec<&str> = request.updates.keys().map(String::as_str).collect();
        let sql = dialect.build_update_row_sql(
            schema,
            &request.table,
            &request.pk_column,
            &columns,
            &column_types,
        );

        let params: Vec<QueryParam> = request
            .updates
            .values()
            .chain(std::iter::once(&request.pk_value))
            .map(QueryParam::from)
            .collect();

        let row_count = self.executor.execute_with_params(&pool, &sql, &params).await?;
        info!(
            connection_id = %connection_id,
            table = %request.table,
            row_count = row_count,
            "Row updated"
        );
        Ok(RowUpdateOutcome::Updated { row_count })
    }
}
