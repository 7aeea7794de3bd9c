//! Schema changes applied as a sequence of single statements.
//!
//! Every operation is validated and rendered before anything is sent, so a bad
//! identifier never leaves earlier statements applied. Execution is not
//! transactional: statements run in input order and the first failure stops
//! the sequence, leaving everything before it in place.

use crate::db::dialect::Dialect;
use crate::db::identifier::validate_identifier;
use crate::db::{DbPool, PoolRegistry, QueryExecutor};
use crate::error::{DbError, DbResult};
use crate::models::AlterOperation;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A statement that ran successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct AppliedStatement {
    /// Position of the operation in the request
    pub index: usize,
    pub operation: String,
    pub sql: String,
}

/// The statement that stopped the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct StatementFailure {
    pub index: usize,
    pub operation: String,
    pub sql: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct SchemaChangeReport {
    pub applied: Vec<AppliedStatement>,
    /// Operations with an unrecognized type
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StatementFailure>,
}

impl SchemaChangeReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Turn a stopped sequence into [`DbError::PartialSchemaMutation`].
    pub fn into_result(self) -> DbResult<Self> {
        match self.failure {
            None => Ok(self),
            Some(failure) => Err(DbError::PartialSchemaMutation {
                applied: self.applied.into_iter().map(|s| s.sql).collect(),
                failed_statement: failure.sql,
                message: failure.message,
            }),
        }
    }
}

/// A rendered statement waiting to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStatement {
    pub index: usize,
    pub operation: &'static str,
    pub sql: String,
}

/// Validate `operations` and render one statement per known operation.
///
/// Returns the statements in input order and the number of skipped unknown
/// operations.
pub fn plan_statements(
    dialect: Dialect,
    schema: &str,
    table: &str,
    operations: &[AlterOperation],
) -> DbResult<(Vec<PlannedStatement>, usize)> {
    validate_identifier(schema)?;
    validate_identifier(table)?;
    for op in operations {
        op.validate()?;
    }

    let quoted_table = dialect.quote_table(Some(schema), table);
    let mut planned = Vec::with_capacity(operations.len());
    let mut skipped = 0;
    for (index, op) in operations.iter().enumerate() {
        let sql = dialect.build_alter_table_sql(&quoted_table, op);
        if sql.is_empty() {
            warn!(index = index, "Skipping unrecognized alter operation");
            skipped += 1;
            continue;
        }
        planned.push(PlannedStatement {
            index,
            operation: op.kind(),
            sql,
        });
    }
    Ok((planned, skipped))
}

/// Runs one DDL statement.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    async fn run(&self, sql: &str) -> DbResult<()>;
}

/// Runs statements on a pool through the query executor.
pub struct PoolStatementRunner {
    pool: DbPool,
    executor: QueryExecutor,
}

impl PoolStatementRunner {
    pub fn new(pool: DbPool, executor: QueryExecutor) -> Self {
        Self { pool, executor }
    }
}

#[async_trait]
impl StatementRunner for PoolStatementRunner {
    async fn run(&self, sql: &str) -> DbResult<()> {
        self.executor.execute(&self.pool, sql, None).await.map(|_| ())
    }
}

/// Run `planned` in order, stopping at the first failure.
pub async fn apply_statements(
    runner: &dyn StatementRunner,
    planned: Vec<PlannedStatement>,
    skipped: usize,
) -> SchemaChangeReport {
    let mut report = SchemaChangeReport {
        skipped,
        ..Default::default()
    };

    for statement in planned {
        debug!(index = statement.index, sql = %statement.sql, "Applying statement");
        match runner.run(&statement.sql).await {
            Ok(()) => report.applied.push(AppliedStatement {
                index: statement.index,
                operation: statement.operation.to_string(),
                sql: statement.sql,
            }),
            Err(e) => {
                warn!(index = statement.index, error = %e, "Schema change stopped");
                report.failure = Some(StatementFailure {
                    index: statement.index,
                    operation: statement.operation.to_string(),
                    sql: statement.sql,
                    message: e.to_string(),
                });
                break;
            }
        }
    }
    report
}

/// Handler for table alterations.
pub struct SchemaChangeHandler {
    registry: Arc<PoolRegistry>,
    executor: QueryExecutor,
}

impl SchemaChangeHandler {
    pub fn new(registry: Arc<PoolRegistry>, executor: QueryExecutor) -> Self {
        Self { registry, executor }
    }

    /// Apply `operations` to `schema.table` in order.
    ///
    /// A statement failure is reported in the returned report, not as an
    /// error; use [`SchemaChangeReport::into_result`] to convert it.
    pub async fn apply(
        &self,
        connection_id: &str,
        database: Option<&str>,
        schema: &str,
        table: &str,
        operations: &[AlterOperation],
    ) -> DbResult<SchemaChangeReport> {
        if operations.is_empty() {
            return Ok(SchemaChangeReport::default());
        }

        let pool = self.registry.get(connection_id, database).await?;
        let (planned, skipped) = plan_statements(pool.dialect(), schema, table, operations)?;
        if planned.is_empty() {
            return Ok(SchemaChangeReport {
                skipped,
                ..Default::default()
            });
        }

        let runner = PoolStatementRunner::new(pool, self.executor.clone());
        let report = apply_statements(&runner, planned, skipped).await;
        info!(
            connection_id = %connection_id,
            table = %table,
            applied = report.applied.len(),
            skipped = report.skipped,
            failed = !report.is_complete(),
            "Schema change finished"
        );
        Ok(report)
    }
}
