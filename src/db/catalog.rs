//! Catalog introspection.
//!
//! [`Catalog`] dispatches on the pool variant to the engine submodules of
//! [`crate::db::dialect`] and turns the raw names they return into
//! addressable [`SchemaObject`]s. Objects whose names cannot be encoded in a
//! node id are skipped with a warning rather than returned with a broken id.

use crate::db::dialect::{mssql, mysql, postgres};
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDetails, DatabaseMetrics, ObjectKind, Relationship, SchemaObject};
use crate::namespace::{FolderKind, NodeId, ROOT_ID, Segment, compose};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One column row as read from an engine catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    /// Name of the primary key constraint this column belongs to
    pub pk_constraint: Option<String>,
}

impl CatalogColumn {
    fn into_details(self) -> (String, ColumnDetails) {
        let details = ColumnDetails::new(self.data_type, self.nullable)
            .with_default(self.default_value)
            .with_primary_key(self.pk_constraint);
        (self.name, details)
    }
}

/// Build child nodes of `parent`, dropping names that cannot be addressed.
fn children(
    names: Vec<String>,
    kind: ObjectKind,
    parent: Option<&NodeId>,
    segment: impl Fn(String) -> Segment,
) -> Vec<SchemaObject> {
    let parent_id = parent.map_or(ROOT_ID, NodeId::as_str);
    names
        .into_iter()
        .filter_map(|name| {
            let seg = segment(name.clone());
            let id = match parent {
                Some(p) => p.child(seg),
                None => compose(&[seg]),
            };
            match id {
                Ok(id) => Some(SchemaObject::new(&id, name, kind, parent_id)),
                Err(e) => {
                    warn!(name = %name, kind = %kind, error = %e, "Skipping unaddressable object");
                    None
                }
            }
        })
        .collect()
}

/// Postgres and SQL Server always have a schema; fall back to the default one.
fn schema_or_default<'a>(pool: &DbPool, schema: Option<&'a str>) -> DbResult<&'a str> {
    schema
        .or(pool.dialect().default_schema())
        .ok_or_else(|| DbError::invalid_input("A schema name is required"))
}

/// Catalog introspection across engines.
pub struct Catalog;

impl Catalog {
    /// Databases on the server, as root-level nodes.
    ///
    /// MySQL has no level above its databases, so they are returned as
    /// schema nodes; everything under them then behaves like a schema.
    pub async fn get_databases(pool: &DbPool) -> DbResult<Vec<SchemaObject>> {
        let objects = match pool {
            DbPool::Postgres(p) => children(
                postgres::list_databases(p).await?,
                ObjectKind::Database,
                None,
                Segment::Database,
            ),
            DbPool::MySql(p) => children(
                mysql::list_databases(p).await?,
                ObjectKind::Schema,
                None,
                Segment::Schema,
            ),
            DbPool::MsSql(p) => children(
                mssql::list_databases(p).await?,
                ObjectKind::Database,
                None,
                Segment::Database,
            ),
        };
        debug!(count = objects.len(), dialect = %pool.dialect(), "Listed databases");
        Ok(objects)
    }

    /// Schemas of the pool's database. Always empty for MySQL.
    ///
    /// When `parent` is None the schemas are root-level nodes.
    pub async fn get_schemas(pool: &DbPool, parent: Option<&NodeId>) -> DbResult<Vec<SchemaObject>> {
        let names = match pool {
            DbPool::Postgres(p) => postgres::list_schemas(p).await?,
            DbPool::MySql(_) => return Ok(Vec::new()),
            DbPool::MsSql(p) => mssql::list_schemas(p).await?,
        };
        Ok(children(names, ObjectKind::Schema, parent, Segment::Schema))
    }

    /// Contents of one folder under `schema` (for MySQL, the database name).
    pub async fn get_objects(
        pool: &DbPool,
        folder: FolderKind,
        schema: Option<&str>,
        parent: &NodeId,
    ) -> DbResult<Vec<SchemaObject>> {
        match folder {
            FolderKind::Tables => Self::get_tables(pool, schema, parent).await,
            FolderKind::Views => Self::get_views(pool, schema, parent).await,
            FolderKind::Functions => Self::get_functions(pool, schema, parent).await,
        }
    }

    pub async fn get_tables(
        pool: &DbPool,
        schema: Option<&str>,
        parent: &NodeId,
    ) -> DbResult<Vec<SchemaObject>> {
        let names = match pool {
            DbPool::Postgres(p) => postgres::list_tables(p, schema_or_default(pool, schema)?).await?,
            DbPool::MySql(p) => mysql::list_tables(p, schema).await?,
            DbPool::MsSql(p) => mssql::list_tables(p, schema_or_default(pool, schema)?).await?,
        };
        Ok(children(names, ObjectKind::Table, Some(parent), Segment::Table))
    }

    pub async fn get_views(
        pool: &DbPool,
        schema: Option<&str>,
        parent: &NodeId,
    ) -> DbResult<Vec<SchemaObject>> {
        let names = match pool {
            DbPool::Postgres(p) => postgres::list_views(p, schema_or_default(pool, schema)?).await?,
            DbPool::MySql(p) => mysql::list_views(p, schema).await?,
            DbPool::MsSql(p) => mssql::list_views(p, schema_or_default(pool, schema)?).await?,
        };
        Ok(children(names, ObjectKind::View, Some(parent), Segment::View))
    }

    pub async fn get_functions(
        pool: &DbPool,
        schema: Option<&str>,
        parent: &NodeId,
    ) -> DbResult<Vec<SchemaObject>> {
        let names = match pool {
            DbPool::Postgres(p) => {
                postgres::list_functions(p, schema_or_default(pool, schema)?).await?
            }
            DbPool::MySql(p) => mysql::list_functions(p, schema).await?,
            DbPool::MsSql(p) => mssql::list_functions(p, schema_or_default(pool, schema)?).await?,
        };
        Ok(children(
            names,
            ObjectKind::Function,
            Some(parent),
            Segment::Function,
        ))
    }

    /// Columns of a table or view, in ordinal order. Column ids extend `table_id`.
    pub async fn get_columns(
        pool: &DbPool,
        schema: Option<&str>,
        table: &str,
        table_id: &NodeId,
    ) -> DbResult<Vec<SchemaObject>> {
        let columns = match pool {
            DbPool::Postgres(p) => {
                postgres::list_columns(p, schema_or_default(pool, schema)?, table).await?
            }
            DbPool::MySql(p) => mysql::list_columns(p, schema, table).await?,
            DbPool::MsSql(p) => {
                mssql::list_columns(p, schema_or_default(pool, schema)?, table).await?
            }
        };
        if columns.is_empty() {
            return Err(DbError::schema("Table not found or has no columns", table));
        }

        let mut objects = Vec::with_capacity(columns.len());
        for column in columns {
            let (name, details) = column.into_details();
            match table_id.child(Segment::Column(name.clone())) {
                Ok(id) => objects.push(SchemaObject::column(&id, name, table_id.as_str(), details)),
                Err(e) => warn!(column = %name, error = %e, "Skipping unaddressable column"),
            }
        }
        debug!(table = table, count = objects.len(), "Described columns");
        Ok(objects)
    }

    /// Column types used to cast bound values in generated DML. Only
    /// Postgres needs them; other engines convert bound values implicitly.
    pub async fn column_types(
        pool: &DbPool,
        schema: Option<&str>,
        table: &str,
    ) -> DbResult<HashMap<String, String>> {
        match pool {
            DbPool::Postgres(p) => {
                postgres::column_types(p, schema_or_default(pool, schema)?, table).await
            }
            DbPool::MySql(_) | DbPool::MsSql(_) => Ok(HashMap::new()),
        }
    }

    /// Foreign key edges visible from the pool's database, optionally limited
    /// to one schema (for MySQL, one database).
    pub async fn get_relationships(
        pool: &DbPool,
        schema: Option<&str>,
    ) -> DbResult<Vec<Relationship>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_relationships(p, schema).await,
            DbPool::MySql(p) => mysql::list_relationships(p, schema).await,
            DbPool::MsSql(p) => mssql::list_relationships(p, schema).await,
        }
    }

    pub async fn get_database_metrics(pool: &DbPool) -> DbResult<DatabaseMetrics> {
        match pool {
            DbPool::Postgres(p) => postgres::database_metrics(p).await,
            DbPool::MySql(p) => mysql::database_metrics(p).await,
            DbPool::MsSql(p) => mssql::database_metrics(p).await,
        }
    }

    pub async fn create_database(pool: &DbPool, name: &str) -> DbResult<()> {
        match pool {
            DbPool::Postgres(p) => postgres::create_database(p, name).await,
            DbPool::MySql(p) => mysql::create_database(p, name).await,
            DbPool::MsSql(p) => mssql::create_database(p, name).await,
        }
    }

    pub async fn drop_database(pool: &DbPool, name: &str) -> DbResult<()> {
        match pool {
            DbPool::Postgres(p) => postgres::drop_database(p, name).await,
            DbPool::MySql(p) => mysql::drop_database(p, name).await,
            DbPool::MsSql(p) => mssql::drop_database(p, name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_skip_unaddressable_names() {
        let parent = compose(&[
            Segment::Schema("public".into()),
            Segment::Folder(FolderKind::Tables),
        ])
        .unwrap();
        let objects = children(
            vec!["orders".into(), "odd.name".into(), "a:b".into()],
            ObjectKind::Table,
            Some(&parent),
            Segment::Table,
        );
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].id, "schema:public.folder:tables.table:orders");
        assert_eq!(objects[0].parent_id, "schema:public.folder:tables");
    }

    #[test]
    fn test_root_children() {
        let objects = children(
            vec!["shop".into()],
            ObjectKind::Schema,
            None,
            Segment::Schema,
        );
        assert_eq!(objects[0].id, "schema:shop");
        assert_eq!(objects[0].parent_id, ROOT_ID);
        assert!(objects[0].has_children);
    }

    #[test]
    fn test_catalog_column_details() {
        let (name, details) = CatalogColumn {
            name: "id".into(),
            data_type: "integer".into(),
            nullable: false,
            default_value: Some(String::new()),
            pk_constraint: Some("users_pkey".into()),
        }
        .into_details();
        assert_eq!(name, "id");
        assert!(details.is_primary_key);
        assert_eq!(details.pk_constraint_name.as_deref(), Some("users_pkey"));
        assert!(details.default_value.is_none());
    }
}
