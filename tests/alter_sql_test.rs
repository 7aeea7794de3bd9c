//! Alter statement rendering for every operation kind on every dialect.

use serde_json::json;
use sqlbridge::db::Dialect;
use sqlbridge::models::{AlterOperation, ForeignKeyAction};
use std::collections::HashSet;

const DIALECTS: [Dialect; 3] = [Dialect::Postgres, Dialect::MySql, Dialect::MsSql];

fn all_operations() -> Vec<AlterOperation> {
    vec![
        AlterOperation::AddColumn {
            name: "age".into(),
            data_type: "int".into(),
            is_nullable: false,
            default_value: Some("0".into()),
        },
        AlterOperation::DropColumn {
            name: "legacy".into(),
        },
        AlterOperation::AlterColumnType {
            name: "age".into(),
            data_type: "bigint".into(),
            is_nullable: Some(true),
        },
        AlterOperation::RenameColumn {
            name: "a".into(),
            new_name: "b".into(),
        },
        AlterOperation::AddPk {
            name: Some("pk_users".into()),
            columns: vec!["id".into()],
        },
        AlterOperation::DropPk {
            name: "pk_users".into(),
        },
        AlterOperation::AddFk {
            name: "fk_users_org".into(),
            columns: vec!["org_id".into()],
            ref_schema: None,
            ref_table: "orgs".into(),
            ref_columns: vec!["id".into()],
            on_delete: Some(ForeignKeyAction::Cascade),
            on_update: None,
        },
        AlterOperation::DropFk {
            name: "fk_users_org".into(),
        },
    ]
}

fn quote_char(dialect: Dialect) -> char {
    match dialect {
        Dialect::Postgres => '"',
        Dialect::MySql => '`',
        Dialect::MsSql => '[',
    }
}

#[test]
fn test_every_operation_renders_distinct_statements() {
    for dialect in DIALECTS {
        let table = dialect.quote_table(Some("app"), "users");
        let statements: Vec<String> = all_operations()
            .iter()
            .map(|op| dialect.build_alter_table_sql(&table, op))
            .collect();

        let own = quote_char(dialect);
        for (op, sql) in all_operations().iter().zip(&statements) {
            assert!(!sql.is_empty(), "{dialect}: {} rendered empty", op.kind());
            assert!(sql.contains(own), "{dialect}: {sql}");
            for other in DIALECTS.into_iter().filter(|d| *d != dialect) {
                assert!(
                    !sql.contains(quote_char(other)),
                    "{dialect} statement uses {other} quoting: {sql}"
                );
            }
        }

        let unique: HashSet<&String> = statements.iter().collect();
        assert_eq!(unique.len(), statements.len(), "{dialect}: {statements:#?}");
    }
}

#[test]
fn test_postgres_reference_statements() {
    let d = Dialect::Postgres;
    let table = d.quote_table(Some("s"), "t");

    let add = AlterOperation::AddColumn {
        name: "age".into(),
        data_type: "int".into(),
        is_nullable: false,
        default_value: None,
    };
    assert_eq!(
        d.build_alter_table_sql(&table, &add),
        "ALTER TABLE \"s\".\"t\" ADD COLUMN \"age\" int NOT NULL"
    );

    let rename = AlterOperation::RenameColumn {
        name: "a".into(),
        new_name: "b".into(),
    };
    assert_eq!(
        d.build_alter_table_sql(&table, &rename),
        "ALTER TABLE \"s\".\"t\" RENAME COLUMN \"a\" TO \"b\""
    );
}

#[test]
fn test_mssql_rename_uses_sp_rename() {
    let d = Dialect::MsSql;
    let table = d.quote_table(Some("dbo"), "t");
    let sql = d.build_alter_table_sql(
        &table,
        &AlterOperation::RenameColumn {
            name: "a".into(),
            new_name: "b".into(),
        },
    );
    assert_eq!(sql, "EXEC sp_rename N'[dbo].[t].[a]', N'b', N'COLUMN'");
}

#[test]
fn test_unknown_operation_from_json_renders_empty() {
    let op: AlterOperation =
        serde_json::from_value(json!({ "type": "add_index", "name": "ix" })).unwrap();
    assert_eq!(op, AlterOperation::Unknown);
    for dialect in DIALECTS {
        assert_eq!(dialect.build_alter_table_sql("t", &op), "");
    }
}
