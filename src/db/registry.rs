//! Connection definitions and the lazily created pools built from them.
//!
//! # Concurrency
//!
//! - **`OnceCell` per pool key**: concurrent first access to the same
//!   `(connection, database)` pair creates exactly one pool; the losers wait
//!   for the winner and share its pool. A failed creation leaves the cell
//!   empty so the next caller retries.
//! - **Locks are never held across driver calls**: teardown drains the
//!   affected cells under the write lock, then closes them after releasing it.
//! - **Lock order is definitions, then pools**: `update` and `remove` hold the
//!   definitions lock while draining, and `get` reads the definition and
//!   registers its cell under both locks. A cell drained while its pool is
//!   still being created no longer belongs to the map; its creator closes the
//!   new pool and retries against the current definition.
//! - **Teardown is best effort**: a pool that fails to close is logged and
//!   the remaining pools are still closed. Operations in flight on a pool
//!   being torn down may fail with a closed-pool error.

use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDefinition, ConnectionSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Identity of one pool: a connection and the database it targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub connection_id: String,
    /// None targets the server without selecting a database
    pub database: Option<String>,
}

impl PoolKey {
    pub fn new(connection_id: impl Into<String>, database: Option<&str>) -> Self {
        Self {
            connection_id: connection_id.into(),
            database: database.map(String::from),
        }
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}/{}", self.connection_id, db),
            None => write!(f, "{}/<server>", self.connection_id),
        }
    }
}

/// Builds and tears down pools for the registry.
#[async_trait]
pub trait PoolConnector: Send + Sync {
    async fn connect(&self, def: &ConnectionDefinition, database: Option<&str>)
    -> DbResult<DbPool>;

    async fn close(&self, pool: DbPool) -> DbResult<()> {
        pool.close().await;
        Ok(())
    }
}

/// Connector that opens real driver pools.
#[derive(Debug, Clone)]
pub struct DriverConnector {
    connect_timeout: Duration,
}

impl DriverConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl PoolConnector for DriverConnector {
    async fn connect(
        &self,
        def: &ConnectionDefinition,
        database: Option<&str>,
    ) -> DbResult<DbPool> {
        tokio::time::timeout(self.connect_timeout, DbPool::connect(def, database))
            .await
            .map_err(|_| {
                DbError::timeout(
                    format!("connecting to {}", def.masked_location()),
                    self.connect_timeout.as_secs(),
                )
            })?
    }
}

type PoolCell = Arc<OnceCell<DbPool>>;

/// Owns connection definitions and one pool per [`PoolKey`].
pub struct PoolRegistry {
    connector: Arc<dyn PoolConnector>,
    definitions: RwLock<HashMap<String, ConnectionDefinition>>,
    pools: RwLock<HashMap<PoolKey, PoolCell>>,
}

impl PoolRegistry {
    pub fn new(connector: Arc<dyn PoolConnector>) -> Self {
        Self {
            connector,
            definitions: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Registry backed by real driver pools.
    pub fn with_driver(connect_timeout: Duration) -> Self {
        Self::new(Arc::new(DriverConnector::new(connect_timeout)))
    }

    /// Add a new connection. No pool is opened until first use.
    pub async fn register(&self, def: ConnectionDefinition) -> DbResult<()> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&def.id) {
            return Err(DbError::invalid_input(format!(
                "Connection '{}' already exists",
                def.id
            )));
        }
        info!(connection_id = %def.id, engine = %def.engine, "Registered connection");
        definitions.insert(def.id.clone(), def);
        Ok(())
    }

    /// Replace a connection's definition, closing every pool built from the old one.
    pub async fn update(&self, def: ConnectionDefinition) -> DbResult<()> {
        let drained = {
            let mut definitions = self.definitions.write().await;
            if !definitions.contains_key(&def.id) {
                return Err(DbError::connection_not_found(&def.id));
            }
            let drained = self.drain(&def.id).await;
            definitions.insert(def.id.clone(), def.clone());
            drained
        }; // Locks released here

        let closed = self.close_cells(drained).await;
        info!(connection_id = %def.id, pools_closed = closed, "Updated connection");
        Ok(())
    }

    /// Forget a connection and close its pools.
    pub async fn remove(&self, connection_id: &str) -> DbResult<()> {
        let drained = {
            let mut definitions = self.definitions.write().await;
            if definitions.remove(connection_id).is_none() {
                return Err(DbError::connection_not_found(connection_id));
            }
            self.drain(connection_id).await
        };

        let closed = self.close_cells(drained).await;
        info!(connection_id = %connection_id, pools_closed = closed, "Removed connection");
        Ok(())
    }

    pub async fn definition(&self, connection_id: &str) -> DbResult<ConnectionDefinition> {
        self.definitions
            .read()
            .await
            .get(connection_id)
            .cloned()
            .ok_or_else(|| DbError::connection_not_found(connection_id))
    }

    /// Registered connections, ordered by id.
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let definitions = self.definitions.read().await;
        let mut summaries: Vec<ConnectionSummary> =
            definitions.values().map(ConnectionSummary::from).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// The pool for `connection_id`, targeting `database_override` or the
    /// connection's default database. Created on first use.
    pub async fn get(
        &self,
        connection_id: &str,
        database_override: Option<&str>,
    ) -> DbResult<DbPool> {
        if database_override == Some("") {
            return Err(DbError::invalid_input(
                "Database name cannot be empty. Omit it to use the connection default.",
            ));
        }
        loop {
            let (def, key, cell) = {
                let definitions = self.definitions.read().await;
                let def = definitions
                    .get(connection_id)
                    .cloned()
                    .ok_or_else(|| DbError::connection_not_found(connection_id))?;
                let key = PoolKey::new(connection_id, def.effective_database(database_override));
                let cell = self.cell(&key).await;
                (def, key, cell)
            };

            let created = AtomicBool::new(false);
            let pool = cell
                .get_or_try_init(|| async {
                    created.store(true, Ordering::SeqCst);
                    info!(connection_id = %connection_id, database = ?key.database, "Creating pool");
                    self.connector.connect(&def, key.database.as_deref()).await
                })
                .await?
                .clone();

            if self.is_registered(&key, &cell).await {
                debug!(pool = %key, "Returning pool");
                return Ok(pool);
            }

            // The connection changed while this pool was being created
            if created.load(Ordering::SeqCst) {
                self.close_cells(vec![(key.clone(), cell)]).await;
            }
            debug!(pool = %key, "Pool superseded during creation, retrying");
        }
    }

    /// The cell for `key`, inserted if absent.
    async fn cell(&self, key: &PoolKey) -> PoolCell {
        if let Some(cell) = self.pools.read().await.get(key) {
            return Arc::clone(cell);
        }
        let mut pools = self.pools.write().await;
        // Double-check after acquiring write lock
        Arc::clone(pools.entry(key.clone()).or_default())
    }

    async fn is_registered(&self, key: &PoolKey, cell: &PoolCell) -> bool {
        self.pools
            .read()
            .await
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
    }

    /// Close and forget every pool of `connection_id`. Returns how many
    /// initialized pools were closed.
    pub async fn remove_all(&self, connection_id: &str) -> usize {
        let drained = self.drain(connection_id).await;
        self.close_cells(drained).await
    }

    /// Take every cell of `connection_id` out of the map.
    async fn drain(&self, connection_id: &str) -> Vec<(PoolKey, PoolCell)> {
        let mut pools = self.pools.write().await;
        let keys: Vec<PoolKey> = pools
            .keys()
            .filter(|k| k.connection_id == connection_id)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|k| pools.remove(&k).map(|cell| (k, cell)))
            .collect()
    }

    /// Close the single pool of `connection_id` targeting `database`, if open.
    pub async fn evict(&self, connection_id: &str, database: Option<&str>) -> bool {
        let key = PoolKey::new(connection_id, database);
        let cell = self.pools.write().await.remove(&key);
        match cell {
            Some(cell) => self.close_cells(vec![(key, cell)]).await > 0,
            None => false,
        }
    }

    /// Number of initialized pools.
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|cell| cell.get().is_some()).count()
    }

    /// Close every pool. Definitions are kept.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<(PoolKey, PoolCell)> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        };
        self.close_cells(drained).await
    }

    async fn close_cells(&self, cells: Vec<(PoolKey, PoolCell)>) -> usize {
        let mut closed = 0;
        for (key, cell) in cells {
            let Some(pool) = cell.get().cloned() else {
                continue;
            };
            match self.connector.close(pool).await {
                Ok(()) => {
                    info!(pool = %key, "Closed pool");
                    closed += 1;
                }
                Err(e) => warn!(pool = %key, error = %e, "Failed to close pool"),
            }
        }
        closed
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineFamily;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    struct LazyConnector;

    #[async_trait]
    impl PoolConnector for LazyConnector {
        async fn connect(
            &self,
            _def: &ConnectionDefinition,
            _database: Option<&str>,
        ) -> DbResult<DbPool> {
            Ok(DbPool::Postgres(
                PgPoolOptions::new().connect_lazy_with(PgConnectOptions::new()),
            ))
        }
    }

    fn def(id: &str) -> ConnectionDefinition {
        ConnectionDefinition::new(id, EngineFamily::Postgres, "localhost")
            .unwrap()
            .with_database("app")
    }

    #[test]
    fn test_pool_key_display() {
        assert_eq!(PoolKey::new("c1", Some("shop")).to_string(), "c1/shop");
        assert_eq!(PoolKey::new("c1", None).to_string(), "c1/<server>");
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let registry = PoolRegistry::new(Arc::new(LazyConnector));
        registry.register(def("a")).await.unwrap();
        assert!(registry.register(def("a")).await.is_err());
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_connection() {
        let registry = PoolRegistry::new(Arc::new(LazyConnector));
        let err = registry.get("missing", None).await.unwrap_err();
        assert!(matches!(err, DbError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_database_override_rejected() {
        let registry = PoolRegistry::new(Arc::new(LazyConnector));
        registry.register(def("a")).await.unwrap();
        let err = registry.get("a", Some("")).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_default_and_override_are_distinct_keys() {
        let registry = PoolRegistry::new(Arc::new(LazyConnector));
        registry.register(def("a")).await.unwrap();
        registry.get("a", None).await.unwrap();
        registry.get("a", Some("app")).await.unwrap();
        assert_eq!(registry.pool_count().await, 1);
        registry.get("a", Some("other")).await.unwrap();
        assert_eq!(registry.pool_count().await, 2);
        assert!(registry.evict("a", Some("other")).await);
        assert!(!registry.evict("a", Some("other")).await);
        assert_eq!(registry.pool_count().await, 1);
    }
}
