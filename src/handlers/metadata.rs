//! Metadata orchestration.
//!
//! Expanding a node is split in two: [`plan_hierarchy`] decides from the
//! node id alone which catalog call answers it, and [`MetadataHandler`]
//! obtains the right pool and performs that call. Planning order matters:
//! folder ids also contain `db:` and `schema:` segments, so folders are
//! recognized before schemas and databases.

use crate::db::dialect::Dialect;
use crate::db::{Catalog, PoolRegistry};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionDefinition, DatabaseMetrics, ObjectKind, Relationship, SchemaObject,
};
use crate::namespace::{FolderKind, NodeId, NodeKind, NodePath, ROOT_ID, Segment, classify};
use std::sync::Arc;
use tracing::{debug, info};

/// Which catalog call answers a hierarchy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyStep {
    /// Every database on the server, as root nodes
    Databases,
    /// Schemas of `database` (the connection default when None)
    Schemas {
        database: Option<String>,
        parent: Option<NodeId>,
    },
    /// The three fixed folders under a schema; no I/O needed
    Folders { parent: NodeId },
    /// Contents of one folder
    Objects {
        database: Option<String>,
        schema: Option<String>,
        folder: FolderKind,
        parent: NodeId,
    },
    /// Nothing below this node
    Leaf,
}

fn is_root(parent_id: Option<&str>) -> bool {
    matches!(parent_id, None | Some("") | Some(ROOT_ID))
}

/// Decide how to expand `parent_id` for connection `def`.
pub fn plan_hierarchy(def: &ConnectionDefinition, parent_id: Option<&str>) -> DbResult<HierarchyStep> {
    let dialect = Dialect::from(def.engine);

    let Some(id) = parent_id.filter(|_| !is_root(parent_id)) else {
        if !dialect.has_database_level() || def.show_all_databases {
            return Ok(HierarchyStep::Databases);
        }
        return Ok(HierarchyStep::Schemas {
            database: def.database.clone(),
            parent: None,
        });
    };

    let step = match classify(id) {
        NodeKind::Folder => {
            let path = NodePath::resolve(id, None)?;
            let folder = path
                .folder
                .ok_or_else(|| DbError::invalid_node_id(id, "missing folder segment"))?;
            HierarchyStep::Objects {
                database: path.database,
                schema: path.schema.or_else(|| dialect.default_schema().map(String::from)),
                folder,
                parent: NodeId::try_from(id)?,
            }
        }
        NodeKind::Schema => HierarchyStep::Folders {
            parent: NodeId::try_from(id)?,
        },
        NodeKind::Database => {
            let path = NodePath::resolve(id, None)?;
            HierarchyStep::Schemas {
                database: path.database,
                parent: Some(NodeId::try_from(id)?),
            }
        }
        _ => HierarchyStep::Leaf,
    };
    Ok(step)
}

/// The fixed folder nodes of a schema, in display order.
pub fn folder_nodes(parent: &NodeId) -> DbResult<Vec<SchemaObject>> {
    FolderKind::ALL
        .iter()
        .map(|kind| {
            let id = parent.child(Segment::Folder(*kind))?;
            Ok(SchemaObject::new(
                &id,
                kind.label(),
                ObjectKind::Folder,
                parent.as_str(),
            ))
        })
        .collect()
}

/// Hierarchy, column, relationship and metrics lookups.
pub struct MetadataHandler {
    registry: Arc<PoolRegistry>,
}

impl MetadataHandler {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    /// Children of `parent_id`, or of the root when it is None or "root".
    pub async fn get_hierarchy(
        &self,
        connection_id: &str,
        parent_id: Option<&str>,
    ) -> DbResult<Vec<SchemaObject>> {
        let def = self.registry.definition(connection_id).await?;
        let step = plan_hierarchy(&def, parent_id)?;
        debug!(connection_id = %connection_id, parent = ?parent_id, step = ?step, "Expanding node");

        match step {
            HierarchyStep::Databases => {
                let pool = self.registry.get(connection_id, None).await?;
                Catalog::get_databases(&pool).await
            }
            HierarchyStep::Schemas { database, parent } => {
                let pool = self.registry.get(connection_id, database.as_deref()).await?;
                Catalog::get_schemas(&pool, parent.as_ref()).await
            }
            HierarchyStep::Folders { parent } => folder_nodes(&parent),
            HierarchyStep::Objects {
                database,
                schema,
                folder,
                parent,
            } => {
                let pool = self.registry.get(connection_id, database.as_deref()).await?;
                Catalog::get_objects(&pool, folder, schema.as_deref(), &parent).await
            }
            HierarchyStep::Leaf => Ok(Vec::new()),
        }
    }

    /// Columns of the table or view addressed by `node_id`.
    pub async fn get_columns(
        &self,
        connection_id: &str,
        node_id: &str,
    ) -> DbResult<Vec<SchemaObject>> {
        let def = self.registry.definition(connection_id).await?;
        let dialect = Dialect::from(def.engine);
        let path = NodePath::resolve(node_id, dialect.default_schema())?;

        let table = match (&path.object, &path.column) {
            (Some(Segment::Table(name)) | Some(Segment::View(name)), None) => name.clone(),
            _ => {
                return Err(DbError::invalid_node_id(
                    node_id,
                    "columns can only be listed for tables and views",
                ));
            }
        };
        let table_id = NodeId::try_from(node_id)?;

        let pool = self.registry.get(connection_id, path.database.as_deref()).await?;
        Catalog::get_columns(&pool, path.schema.as_deref(), &table, &table_id).await
    }

    /// Foreign key edges of `database` (connection default when None),
    /// optionally limited to one schema.
    pub async fn get_relationships(
        &self,
        connection_id: &str,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> DbResult<Vec<Relationship>> {
        let pool = self.registry.get(connection_id, database).await?;
        // On MySQL the database is the schema
        let schema = match pool.dialect() {
            Dialect::MySql => schema.or(database),
            _ => schema,
        };
        let relationships = Catalog::get_relationships(&pool, schema).await?;
        info!(
            connection_id = %connection_id,
            count = relationships.len(),
            "Listed relationships"
        );
        Ok(relationships)
    }

    pub async fn get_database_metrics(
        &self,
        connection_id: &str,
        database: Option<&str>,
    ) -> DbResult<DatabaseMetrics> {
        let pool = self.registry.get(connection_id, database).await?;
        Catalog::get_database_metrics(&pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineFamily;

    fn pg() -> ConnectionDefinition {
        ConnectionDefinition::new("pg", EngineFamily::Postgres, "localhost")
            .unwrap()
            .with_database("app")
    }

    #[test]
    fn test_root_aliases() {
        for parent in [None, Some(""), Some("root")] {
            assert_eq!(
                plan_hierarchy(&pg(), parent).unwrap(),
                HierarchyStep::Schemas {
                    database: Some("app".into()),
                    parent: None
                }
            );
        }
    }

    #[test]
    fn test_database_node_lists_its_schemas() {
        let step = plan_hierarchy(&pg(), Some("db:shop")).unwrap();
        assert_eq!(
            step,
            HierarchyStep::Schemas {
                database: Some("shop".into()),
                parent: Some(NodeId::try_from("db:shop").unwrap()),
            }
        );
    }

    #[test]
    fn test_leaf_nodes_have_no_children() {
        let def = pg();
        for id in [
            "schema:public.folder:tables.table:t",
            "schema:public.folder:functions.func:f",
            "garbage:thing",
        ] {
            assert_eq!(plan_hierarchy(&def, Some(id)).unwrap(), HierarchyStep::Leaf);
        }
    }

    #[test]
    fn test_folder_nodes_fixed_order() {
        let parent = NodeId::try_from("schema:public").unwrap();
        let folders = folder_nodes(&parent).unwrap();
        let names: Vec<_> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Tables", "Views", "Functions"]);
        assert!(folders.iter().all(|f| f.parent_id == "schema:public"));
    }
}
