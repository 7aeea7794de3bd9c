//! Schema changes stop at the first failure; empty row updates never reach a driver.

mod common;

use async_trait::async_trait;
use common::{CountingConnector, postgres_def};
use serde_json::json;
use sqlbridge::db::{Dialect, PoolRegistry, QueryExecutor};
use sqlbridge::error::{DbError, DbResult};
use sqlbridge::handlers::{
    RowUpdateHandler, SchemaChangeHandler, StatementRunner, apply_statements, plan_statements,
};
use sqlbridge::models::{AlterOperation, RowUpdate, RowUpdateOutcome};
use std::sync::Arc;
use std::sync::Mutex;

/// Records every statement and fails the ones containing `fail_on`.
struct ScriptedRunner {
    fail_on: &'static str,
    seen: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn new(fail_on: &'static str) -> Self {
        Self {
            fail_on,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementRunner for ScriptedRunner {
    async fn run(&self, sql: &str) -> DbResult<()> {
        self.seen.lock().unwrap().push(sql.to_string());
        if sql.contains(self.fail_on) {
            return Err(DbError::database(
                format!("column \"{}\" does not exist", self.fail_on),
                Some("42703".to_string()),
                "Check the column name",
            ));
        }
        Ok(())
    }
}

fn drop_column(name: &str) -> AlterOperation {
    AlterOperation::DropColumn { name: name.into() }
}

#[tokio::test]
async fn test_schema_change_stops_at_first_failure() {
    let ops = vec![drop_column("a"), drop_column("missing"), drop_column("c")];
    let (planned, skipped) = plan_statements(Dialect::Postgres, "public", "t", &ops).unwrap();
    let runner = ScriptedRunner::new("missing");

    let report = apply_statements(&runner, planned, skipped).await;

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].index, 0);
    assert_eq!(
        report.applied[0].sql,
        "ALTER TABLE \"public\".\"t\" DROP COLUMN \"a\""
    );
    let failure = report.failure.clone().unwrap();
    assert_eq!(failure.index, 1);
    assert!(failure.message.contains("does not exist"));
    // op3 is never attempted
    assert_eq!(runner.seen().len(), 2);

    match report.into_result() {
        Err(DbError::PartialSchemaMutation { applied, .. }) => assert_eq!(applied.len(), 1),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_operations_are_skipped() {
    let ops = vec![AlterOperation::Unknown, drop_column("a")];
    let (planned, skipped) = plan_statements(Dialect::MySql, "shop", "t", &ops).unwrap();
    let runner = ScriptedRunner::new("never");

    let report = apply_statements(&runner, planned, skipped).await;
    assert!(report.is_complete());
    assert_eq!(report.skipped, 1);
    assert_eq!(runner.seen(), vec!["ALTER TABLE `shop`.`t` DROP COLUMN `a`"]);
}

#[tokio::test]
async fn test_empty_operation_list_is_noop() {
    let connector = Arc::new(CountingConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("pg")).await.unwrap();
    let handler = SchemaChangeHandler::new(registry, QueryExecutor::default());

    let report = handler.apply("pg", None, "public", "t", &[]).await.unwrap();
    assert!(report.applied.is_empty());
    assert!(report.is_complete());
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_empty_row_update_makes_no_driver_calls() {
    let connector = Arc::new(CountingConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("pg")).await.unwrap();
    let handler = RowUpdateHandler::new(registry.clone(), QueryExecutor::default());

    let request = RowUpdate::new("users", "id", json!(42));
    let outcome = handler.update_row("pg", &request).await.unwrap();

    assert_eq!(outcome, RowUpdateOutcome::NoOp);
    assert_eq!(outcome.row_count(), 0);
    assert_eq!(connector.connects(), 0);
    assert_eq!(registry.pool_count().await, 0);
}

#[tokio::test]
async fn test_row_update_rejects_bad_identifier_before_connecting() {
    let connector = Arc::new(CountingConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("pg")).await.unwrap();
    let handler = RowUpdateHandler::new(registry, QueryExecutor::default());

    let request = RowUpdate::new("users", "id", json!(1)).set("bad\0name", "x");
    let err = handler.update_row("pg", &request).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(connector.connects(), 0);
}
