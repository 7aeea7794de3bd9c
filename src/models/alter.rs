//! Schema and row mutation requests.

use crate::db::identifier::{
    validate_default_expression, validate_identifier, validate_identifiers,
    validate_type_fragment,
};
use crate::error::{DbError, DbResult};
use crate::models::ForeignKeyAction;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

fn default_true() -> bool {
    true
}

/// One engine-neutral schema change against a single table.
///
/// Unrecognized `type` tags deserialize to [`AlterOperation::Unknown`] and are
/// skipped when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlterOperation {
    #[serde(rename_all = "camelCase")]
    AddColumn {
        name: String,
        data_type: String,
        #[serde(default = "default_true")]
        is_nullable: bool,
        #[serde(default)]
        default_value: Option<String>,
    },
    DropColumn {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    AlterColumnType {
        name: String,
        data_type: String,
        /// Some engines restate nullability when the type changes
        #[serde(default)]
        is_nullable: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    RenameColumn {
        name: String,
        new_name: String,
    },
    AddPk {
        /// Constraint name; engines that support it name the key
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
    },
    DropPk {
        /// Constraint name; see `ColumnDetails::pk_constraint_name`
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    AddFk {
        name: String,
        columns: Vec<String>,
        #[serde(default)]
        ref_schema: Option<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        #[serde(default)]
        on_delete: Option<ForeignKeyAction>,
        #[serde(default)]
        on_update: Option<ForeignKeyAction>,
    },
    DropFk {
        name: String,
    },
    #[serde(other)]
    Unknown,
}

impl AlterOperation {
    /// Wire tag of this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::AlterColumnType { .. } => "alter_column_type",
            Self::RenameColumn { .. } => "rename_column",
            Self::AddPk { .. } => "add_pk",
            Self::DropPk { .. } => "drop_pk",
            Self::AddFk { .. } => "add_fk",
            Self::DropFk { .. } => "drop_fk",
            Self::Unknown => "unknown",
        }
    }

    /// Check every identifier and unquotable fragment before SQL is built.
    pub fn validate(&self) -> DbResult<()> {
        match self {
            Self::AddColumn {
                name,
                data_type,
                default_value,
                ..
            } => {
                validate_identifier(name)?;
                validate_type_fragment(data_type)?;
                if let Some(expr) = default_value {
                    validate_default_expression(expr)?;
                }
                Ok(())
            }
            Self::DropColumn { name } | Self::DropPk { name } | Self::DropFk { name } => {
                validate_identifier(name)
            }
            Self::AlterColumnType {
                name, data_type, ..
            } => {
                validate_identifier(name)?;
                validate_type_fragment(data_type)
            }
            Self::RenameColumn { name, new_name } => {
                validate_identifier(name)?;
                validate_identifier(new_name)
            }
            Self::AddPk { name, columns } => {
                if let Some(n) = name {
                    validate_identifier(n)?;
                }
                non_empty("add_pk", "columns", columns)?;
                validate_identifiers(columns.iter().map(String::as_str))
            }
            Self::AddFk {
                name,
                columns,
                ref_schema,
                ref_table,
                ref_columns,
                ..
            } => {
                validate_identifier(name)?;
                validate_identifier(ref_table)?;
                if let Some(s) = ref_schema {
                    validate_identifier(s)?;
                }
                non_empty("add_fk", "columns", columns)?;
                if columns.len() != ref_columns.len() {
                    return Err(DbError::invalid_input(format!(
                        "add_fk '{}' has {} columns but {} referenced columns",
                        name,
                        columns.len(),
                        ref_columns.len()
                    )));
                }
                validate_identifiers(columns.iter().chain(ref_columns).map(String::as_str))
            }
            Self::Unknown => Ok(()),
        }
    }
}

fn non_empty(op: &str, field: &str, values: &[String]) -> DbResult<()> {
    if values.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{} requires at least one entry in {}",
            op, field
        )));
    }
    Ok(())
}

/// Update of a single row addressed by primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdate {
    /// Target database; the connection default when absent
    #[serde(default)]
    pub database: Option<String>,
    /// Defaults to the dialect's default schema
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    pub pk_column: String,
    pub pk_value: JsonValue,
    /// Column name to new value
    #[serde(default)]
    pub updates: Map<String, JsonValue>,
}

impl RowUpdate {
    pub fn new(
        table: impl Into<String>,
        pk_column: impl Into<String>,
        pk_value: impl Into<JsonValue>,
    ) -> Self {
        Self {
            database: None,
            schema: None,
            table: table.into(),
            pk_column: pk_column.into(),
            pk_value: pk_value.into(),
            updates: Map::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.updates.insert(column.into(), value.into());
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.pk_column)?;
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }
        validate_identifiers(self.updates.keys().map(String::as_str))
    }
}

/// Outcome of a row update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowUpdateOutcome {
    /// Nothing to change; no statement was sent
    NoOp,
    #[serde(rename_all = "camelCase")]
    Updated { row_count: u64 },
}

impl RowUpdateOutcome {
    pub fn row_count(&self) -> u64 {
        match self {
            Self::NoOp => 0,
            Self::Updated { row_count } => *row_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_add_column() {
        let op: AlterOperation = serde_json::from_value(json!({
            "type": "add_column",
            "name": "age",
            "dataType": "int",
            "isNullable": false
        }))
        .unwrap();
        assert_eq!(
            op,
            AlterOperation::AddColumn {
                name: "age".into(),
                data_type: "int".into(),
                is_nullable: false,
                default_value: None,
            }
        );
        assert_eq!(op.kind(), "add_column");
    }

    #[test]
    fn test_deserialize_add_fk() {
        let op: AlterOperation = serde_json::from_value(json!({
            "type": "add_fk",
            "name": "fk1",
            "columns": ["a"],
            "refTable": "r",
            "refColumns": ["id"],
            "onDelete": "cascade"
        }))
        .unwrap();
        match op {
            AlterOperation::AddFk {
                ref_table,
                on_delete,
                ..
            } => {
                assert_eq!(ref_table, "r");
                assert_eq!(on_delete, Some(ForeignKeyAction::Cascade));
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let op: AlterOperation =
            serde_json::from_value(json!({"type": "add_check", "expr": "x > 0"})).unwrap();
        assert_eq!(op, AlterOperation::Unknown);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_injection_in_type() {
        let op = AlterOperation::AddColumn {
            name: "age".into(),
            data_type: "int; DROP TABLE users".into(),
            is_nullable: true,
            default_value: None,
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_validate_fk_column_counts() {
        let op = AlterOperation::AddFk {
            name: "fk".into(),
            columns: vec!["a".into(), "b".into()],
            ref_schema: None,
            ref_table: "r".into(),
            ref_columns: vec!["id".into()],
            on_delete: None,
            on_update: None,
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_validate_pk_requires_columns() {
        let op = AlterOperation::AddPk {
            name: None,
            columns: vec![],
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_row_update_builder_and_validation() {
        let update = RowUpdate::new("users", "id", 7)
            .with_schema("public")
            .set("name", "bob")
            .set("age", 30);
        assert_eq!(update.updates.len(), 2);
        assert!(update.validate().is_ok());

        let bad = RowUpdate::new("users", "id", 7).set("", "x");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_row_update_deserialize() {
        let update: RowUpdate = serde_json::from_value(json!({
            "table": "users",
            "pkColumn": "id",
            "pkValue": 1,
            "updates": {"name": "carol"}
        }))
        .unwrap();
        assert_eq!(update.pk_value, json!(1));
        assert!(update.schema.is_none());
    }

    #[test]
    fn test_row_update_outcome_json() {
        let json = serde_json::to_value(RowUpdateOutcome::Updated { row_count: 1 }).unwrap();
        assert_eq!(json, json!({"status": "updated", "rowCount": 1}));
        assert_eq!(
            serde_json::to_value(RowUpdateOutcome::NoOp).unwrap(),
            json!({"status": "no_op"})
        );
        assert_eq!(RowUpdateOutcome::NoOp.row_count(), 0);
    }
}
