//! Data models shared across the crate.

pub mod alter;
pub mod connection;
pub mod query;
pub mod schema;

pub use alter::{AlterOperation, RowUpdate, RowUpdateOutcome};
pub use connection::{
    ConnectionDefinition, ConnectionDefinitionError, ConnectionSummary, EngineFamily,
};
pub use query::{QueryParam, QueryResult, RowMap};
pub use schema::{
    ColumnDetails, DatabaseMetrics, ForeignKeyAction, ObjectKind, Relationship, SchemaObject,
    TableSize, TableTypeCount,
};
