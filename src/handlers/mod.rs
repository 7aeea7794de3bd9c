//! Operations exposed by the library, one handler per concern.
//!
//! Handlers share a [`crate::db::PoolRegistry`] and hold no other state.

pub mod admin;
pub mod metadata;
pub mod query;
pub mod row_update;
pub mod schema_change;

pub use admin::AdminHandler;
pub use metadata::{HierarchyStep, MetadataHandler, folder_nodes, plan_hierarchy};
pub use query::QueryHandler;
pub use row_update::RowUpdateHandler;
pub use schema_change::{
    AppliedStatement, PlannedStatement, PoolStatementRunner, SchemaChangeHandler,
    SchemaChangeReport, StatementFailure, StatementRunner, apply_statements, plan_statements,
};
