//! Dialect strategies.
//!
//! A [`Dialect`] is resolved once from the connection's engine family and
//! carries everything that differs between engines at the SQL text level:
//! identifier quoting, parameter placeholders, default schema and DDL
//! rendering. The engine submodules hold catalog queries, pool construction
//! and the driver calls that go with them.

pub mod mssql;
pub mod mysql;
pub mod postgres;

use crate::models::{AlterOperation, EngineFamily};
use std::collections::HashMap;

/// SQL dialect of one engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    MySql,
    MsSql,
}

impl From<EngineFamily> for Dialect {
    fn from(engine: EngineFamily) -> Self {
        match engine {
            EngineFamily::Postgres => Self::Postgres,
            EngineFamily::MySql => Self::MySql,
            EngineFamily::MsSql => Self::MsSql,
        }
    }
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MsSql => "mssql",
        }
    }

    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::MsSql => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Quote a possibly schema-qualified table name.
    pub fn quote_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    /// Bind placeholder for the 1-based parameter `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            Self::MySql => "?".to_string(),
            Self::MsSql => format!("@P{}", n),
        }
    }

    /// Schema assumed when none is given. MySQL has none: the database is the schema.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("public"),
            Self::MySql => None,
            Self::MsSql => Some("dbo"),
        }
    }

    /// Database to connect to while administering another one.
    pub fn maintenance_database(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("postgres"),
            Self::MySql => None,
            Self::MsSql => Some("master"),
        }
    }

    /// Whether databases sit above schemas in the catalog.
    pub fn has_database_level(&self) -> bool {
        !matches!(self, Self::MySql)
    }

    /// Render one alter operation against an already quoted table.
    ///
    /// Returns an empty string for [`AlterOperation::Unknown`]; callers treat
    /// that as nothing to do.
    pub fn build_alter_table_sql(&self, quoted_table: &str, op: &AlterOperation) -> String {
        if matches!(op, AlterOperation::Unknown) {
            return String::new();
        }
        let clause = match self {
            Self::Postgres => postgres::alter_clause(quoted_table, op),
            Self::MySql => mysql::alter_clause(op),
            Self::MsSql => mssql::alter_clause(quoted_table, op),
        };
        // sp_rename is a procedure call, not an ALTER TABLE clause
        if clause.starts_with("EXEC ") {
            clause
        } else {
            format!("ALTER TABLE {} {}", quoted_table, clause)
        }
    }

    /// Placeholder `n` cast to `column_type` where the engine needs it.
    pub fn typed_placeholder(&self, n: usize, column_type: Option<&str>) -> String {
        match (self, column_type) {
            (Self::Postgres, Some(ty)) => format!("${}::{}", n, ty),
            _ => self.placeholder(n),
        }
    }

    /// Parameterized single-row update. Values bind to placeholders 1..=n in
    /// column order and the primary key binds last. Placeholders of columns
    /// found in `column_types` carry a cast on Postgres.
    pub fn build_update_row_sql(
        &self,
        schema: Option<&str>,
        table: &str,
        pk_column: &str,
        columns: &[&str],
        column_types: &HashMap<String, String>,
    ) -> String {
        let placeholder =
            |n: usize, col: &str| self.typed_placeholder(n, column_types.get(col).map(String::as_str));
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = {}", self.quote_identifier(col), placeholder(i + 1, col)))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote_table(schema, table),
            assignments.join(", "),
            self.quote_identifier(pk_column),
            placeholder(columns.len() + 1, pk_column)
        )
    }

    pub fn create_database_sql(&self, name: &str) -> String {
        format!("CREATE DATABASE {}", self.quote_identifier(name))
    }

    pub fn drop_database_sql(&self, name: &str) -> String {
        format!("DROP DATABASE {}", self.quote_identifier(name))
    }

    pub(crate) fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
