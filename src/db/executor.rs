//! Query execution engine.
//!
//! Runs caller-supplied SQL and normalizes every driver's result shape into
//! one [`QueryResult`]:
//!
//! - Batches with several statements surface only the last statement's result.
//! - `row_count` is the number of rows returned, or the affected-row count
//!   when the last statement returns no rows.
//! - A final query that matches nothing still reports its columns. The sqlx
//!   drivers prepare the statement again to read them, which only works for a
//!   single statement; a batch ending in an empty query reports no columns.
//! - Every call runs under a timeout; expiry yields [`DbError::Timeout`].
//!
//! No validation is applied to the SQL text. Callers own its correctness.
//!
//! # Architecture
//!
//! Each engine has its own submodule below with the same interface, adapted
//! to the driver's streaming API.

use crate::db::pool::DbPool;
use crate::db::types::{RowToJson, mssql_row_to_json};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Timeout applied when none is configured.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Query executor that handles database query execution.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run raw SQL, possibly several statements, and return the last result.
    pub async fn execute(
        &self,
        pool: &DbPool,
        sql: &str,
        query_timeout: Option<Duration>,
    ) -> DbResult<QueryResult> {
        let start = Instant::now();
        let query_timeout = query_timeout.unwrap_or(self.default_timeout);
        debug!(sql = %sql, timeout_secs = query_timeout.as_secs(), "Executing query");

        let future = async {
            match pool {
                DbPool::Postgres(p) => postgres::execute(p, sql).await,
                DbPool::MySql(p) => mysql::execute(p, sql).await,
                DbPool::MsSql(p) => mssql::execute(p, sql).await,
            }
        };
        let result = timeout(query_timeout, future)
            .await
            .map_err(|_| timeout_error("query execution", query_timeout))??;

        debug!(
            row_count = result.row_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query finished"
        );
        Ok(result)
    }

    /// Run one statement with bound parameters and return the affected-row count.
    pub async fn execute_with_params(
        &self,
        pool: &DbPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        debug!(sql = %sql, params = params.len(), "Executing parameterized statement");

        let future = async {
            match pool {
                DbPool::Postgres(p) => postgres::execute_with_params(p, sql, params).await,
                DbPool::MySql(p) => mysql::execute_with_params(p, sql, params).await,
                DbPool::MsSql(p) => mssql::execute_with_params(p, sql, params).await,
            }
        };
        timeout(self.default_timeout, future)
            .await
            .map_err(|_| timeout_error("write operation", self.default_timeout))?
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}

/// Turn the rows and affected count of the last statement into a result.
/// `described` supplies the column names when no row came back.
fn into_result<R: RowToJson>(
    rows: Vec<R>,
    rows_affected: u64,
    described: Option<Vec<String>>,
) -> QueryResult {
    match (rows.first(), described) {
        (Some(first), _) => {
            let columns = first.column_names();
            QueryResult::from_rows(columns, rows.iter().map(RowToJson::to_json_map).collect())
        }
        (None, Some(columns)) if !columns.is_empty() => QueryResult::from_rows(columns, Vec::new()),
        (None, _) => QueryResult::affected(rows_affected),
    }
}

/// Column names of a prepared statement, or None when it cannot be prepared.
fn statement_columns<'q, S>(prepared: Result<S, sqlx::Error>) -> Option<Vec<String>>
where
    S: sqlx::Statement<'q>,
{
    use sqlx::Column;
    match prepared {
        Ok(statement) => Some(
            statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        ),
        Err(e) => {
            debug!(error = %e, "Statement could not be described");
            None
        }
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// sqlx streams each statement's rows followed by a completion marker, so the
// result of the last statement is whatever was collected before the final
// marker.

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use futures_util::TryStreamExt;
    use sqlx::postgres::PgRow;
    use sqlx::{Either, Executor, PgPool};

    pub async fn execute(pool: &PgPool, sql: &str) -> DbResult<QueryResult> {
        let mut stream = pool.fetch_many(sql);
        let mut current: Vec<PgRow> = Vec::new();
        let mut last: Option<(Vec<PgRow>, u64)> = None;

        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => {
                    last = Some((std::mem::take(&mut current), done.rows_affected()));
                }
                Either::Right(row) => current.push(row),
            }
        }

        let (rows, affected) = match last {
            Some(last) if current.is_empty() => last,
            _ => (current, 0),
        };
        let described = if rows.is_empty() {
            statement_columns(pool.prepare(sql).await)
        } else {
            None
        };
        Ok(into_result(rows, affected, described))
    }

    pub async fn execute_with_params(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        Ok(query.execute(pool).await?.rows_affected())
    }
}

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use futures_util::TryStreamExt;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Either, Executor, MySqlPool};

    pub async fn execute(pool: &MySqlPool, sql: &str) -> DbResult<QueryResult> {
        let mut stream = pool.fetch_many(sql);
        let mut current: Vec<MySqlRow> = Vec::new();
        let mut last: Option<(Vec<MySqlRow>, u64)> = None;

        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => {
                    last = Some((std::mem::take(&mut current), done.rows_affected()));
                }
                Either::Right(row) => current.push(row),
            }
        }

        let (rows, affected) = match last {
            Some(last) if current.is_empty() => last,
            _ => (current, 0),
        };
        let described = if rows.is_empty() {
            statement_columns(pool.prepare(sql).await)
        } else {
            None
        };
        Ok(into_result(rows, affected, described))
    }

    pub async fn execute_with_params(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        Ok(query.execute(pool).await?.rows_affected())
    }
}

/// tiberius streams a metadata item before the rows of every result set;
/// statements that produce no result set (DDL, DML) contribute nothing, so a
/// batch without any reports zero rows.
mod mssql {
    use super::*;
    use crate::db::params::bind_mssql_param;
    use crate::db::pool::MssqlPool;
    use futures_util::TryStreamExt;
    use tiberius::{Query, QueryItem};

    pub async fn execute(pool: &MssqlPool, sql: &str) -> DbResult<QueryResult> {
        let mut conn = pool.get().await?;
        let mut stream = conn.simple_query(sql).await?;

        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        while let Some(item) = stream.try_next().await? {
            match item {
                QueryItem::Metadata(meta) => {
                    columns = Some(meta.columns().iter().map(|c| c.name().to_string()).collect());
                    rows.clear();
                }
                QueryItem::Row(row) => rows.push(mssql_row_to_json(&row)),
            }
        }

        Ok(match columns {
            Some(columns) => QueryResult::from_rows(columns, rows),
            None => QueryResult::affected(0),
        })
    }

    pub async fn execute_with_params(
        pool: &MssqlPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let mut conn = pool.get().await?;
        let mut query = Query::new(sql);
        for param in params {
            bind_mssql_param(&mut query, param);
        }
        Ok(query.execute(&mut *conn).await?.total())
    }
}
