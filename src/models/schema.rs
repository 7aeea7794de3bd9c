//! Catalog object models.
//!
//! Every object the hierarchy can return is a [`SchemaObject`]; columns carry
//! extra [`ColumnDetails`]. Relationships and metrics are derived on demand
//! and never cached.

use crate::namespace::NodeId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Database,
    Schema,
    Folder,
    Table,
    View,
    Function,
    Column,
}

impl ObjectKind {
    /// Whether nodes of this kind can be expanded.
    pub fn has_children(&self) -> bool {
        !matches!(self, Self::Function | Self::Column)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Folder => "folder",
            Self::Table => "table",
            Self::View => "view",
            Self::Function => "function",
            Self::Column => "column",
        };
        f.write_str(s)
    }
}

/// A node in the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaObject {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Parent node id, or "root"
    pub parent_id: String,
    pub has_children: bool,
    #[serde(flatten)]
    pub column: Option<ColumnDetails>,
}

impl SchemaObject {
    pub fn new(
        id: &NodeId,
        name: impl Into<String>,
        kind: ObjectKind,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
            kind,
            parent_id: parent_id.into(),
            has_children: kind.has_children(),
            column: None,
        }
    }

    pub fn column(
        id: &NodeId,
        name: impl Into<String>,
        parent_id: impl Into<String>,
        details: ColumnDetails,
    ) -> Self {
        Self {
            column: Some(details),
            ..Self::new(id, name, ObjectKind::Column, parent_id)
        }
    }
}

/// Column-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDetails {
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    /// Needed to drop the primary key on engines that drop it by name
    pub pk_constraint_name: Option<String>,
}

impl ColumnDetails {
    pub fn new(data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            pk_constraint_name: None,
        }
    }

    pub fn with_default(mut self, default_value: Option<String>) -> Self {
        self.default_value = default_value.filter(|d| !d.is_empty());
        self
    }

    /// Mark as part of the primary key named `constraint`.
    pub fn with_primary_key(mut self, constraint: Option<String>) -> Self {
        self.is_primary_key = constraint.is_some();
        self.pk_constraint_name = constraint;
        self
    }
}

/// Directed foreign key edge, one per column pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub constraint_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_schema: Option<String>,
    pub source_table: String,
    pub source_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
    pub target_table: String,
    pub target_column: String,
}

/// Point-in-time size and activity snapshot of one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetrics {
    pub table_count: u64,
    pub size_bytes: u64,
    pub active_connections: u64,
    pub top_tables: Vec<TableSize>,
    pub table_types: Vec<TableTypeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableSize {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub size_bytes: u64,
    /// Estimate from catalog statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableTypeCount {
    #[serde(rename = "type")]
    pub table_type: String,
    pub count: u64,
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}
