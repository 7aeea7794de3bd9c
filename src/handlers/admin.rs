//! Database creation and removal.

use crate::db::dialect::Dialect;
use crate::db::identifier::validate_identifier;
use crate::db::{Catalog, PoolRegistry};
use crate::error::DbResult;
use std::sync::Arc;
use tracing::info;

pub struct AdminHandler {
    registry: Arc<PoolRegistry>,
}

impl AdminHandler {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn create_database(&self, connection_id: &str, name: &str) -> DbResult<()> {
        validate_identifier(name)?;
        let pool = self.registry.get(connection_id, None).await?;
        Catalog::create_database(&pool, name).await?;
        info!(connection_id = %connection_id, database = %name, "Created database");
        Ok(())
    }

    /// Drop `name`, first closing any pool of ours that targets it.
    ///
    /// When `name` is the connection's own default database the statement is
    /// issued from the engine's maintenance database instead.
    pub async fn drop_database(&self, connection_id: &str, name: &str) -> DbResult<()> {
        validate_identifier(name)?;
        let def = self.registry.definition(connection_id).await?;

        self.registry.evict(connection_id, Some(name)).await;

        let database = match def.database.as_deref() {
            Some(default) if default == name => {
                Dialect::from(def.engine).maintenance_database()
            }
            _ => None,
        };
        let pool = self.registry.get(connection_id, database).await?;
        Catalog::drop_database(&pool, name).await?;
        info!(connection_id = %connection_id, database = %name, "Dropped database");
        Ok(())
    }
}
