//! Database abstraction layer.
//!
//! - Dialect strategies (quoting, DDL rendering, per-engine catalog SQL)
//! - Connection pools and the registry that owns them
//! - Catalog introspection
//! - Query execution and parameter binding
//! - Type mappings from driver rows to JSON

pub mod catalog;
pub mod dialect;
pub mod executor;
pub mod identifier;
pub mod params;
pub mod pool;
pub mod registry;
pub mod types;

pub use catalog::{Catalog, CatalogColumn};
pub use dialect::Dialect;
pub use executor::QueryExecutor;
pub use pool::{DbPool, MssqlPool};
pub use registry::{DriverConnector, PoolConnector, PoolKey, PoolRegistry};
