//! sqlbridge
//!
//! A database access layer for Postgres, MySQL and SQL Server: catalog
//! browsing through addressable node ids, raw query execution, table
//! alterations and primary-key row updates over per-connection pools.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod namespace;
pub mod output;

pub use config::Config;
pub use db::{Dialect, PoolRegistry, QueryExecutor};
pub use error::{DbError, DbResult};
pub use handlers::{
    AdminHandler, MetadataHandler, QueryHandler, RowUpdateHandler, SchemaChangeHandler,
};
pub use models::ConnectionDefinition;
