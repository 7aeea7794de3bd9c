//! Hierarchy planning and the node expansions that need no catalog access.

mod common;

use common::{CountingConnector, postgres_def};
use sqlbridge::db::PoolRegistry;
use sqlbridge::handlers::{HierarchyStep, MetadataHandler, plan_hierarchy};
use sqlbridge::models::{ConnectionDefinition, EngineFamily, ObjectKind};
use sqlbridge::namespace::{FolderKind, NodeId};
use std::sync::Arc;

#[test]
fn test_root_without_show_all_lists_schemas() {
    let def = postgres_def("pg");
    assert_eq!(
        plan_hierarchy(&def, None).unwrap(),
        HierarchyStep::Schemas {
            database: Some("app".into()),
            parent: None,
        }
    );
}

#[test]
fn test_root_with_show_all_lists_databases() {
    let def = postgres_def("pg").with_show_all_databases(true);
    assert_eq!(plan_hierarchy(&def, None).unwrap(), HierarchyStep::Databases);

    let def = ConnectionDefinition::new("ms", EngineFamily::MsSql, "sql.local")
        .unwrap()
        .with_show_all_databases(true);
    assert_eq!(plan_hierarchy(&def, Some("root")).unwrap(), HierarchyStep::Databases);
}

#[test]
fn test_mysql_root_always_lists_databases() {
    let def = ConnectionDefinition::new("my", EngineFamily::MySql, "localhost")
        .unwrap()
        .with_database("shop");
    assert_eq!(plan_hierarchy(&def, None).unwrap(), HierarchyStep::Databases);
}

#[test]
fn test_folder_detected_before_database() {
    let def = postgres_def("pg").with_show_all_databases(true);
    let id = "db:shop.schema:sales.folder:views";
    assert_eq!(
        plan_hierarchy(&def, Some(id)).unwrap(),
        HierarchyStep::Objects {
            database: Some("shop".into()),
            schema: Some("sales".into()),
            folder: FolderKind::Views,
            parent: NodeId::try_from(id).unwrap(),
        }
    );
}

#[test]
fn test_mysql_folder_uses_schema_as_database() {
    let def = ConnectionDefinition::new("my", EngineFamily::MySql, "localhost").unwrap();
    assert_eq!(
        plan_hierarchy(&def, Some("schema:shop.folder:tables")).unwrap(),
        HierarchyStep::Objects {
            database: None,
            schema: Some("shop".into()),
            folder: FolderKind::Tables,
            parent: NodeId::try_from("schema:shop.folder:tables").unwrap(),
        }
    );
}

#[tokio::test]
async fn test_schema_expands_to_three_folders_without_io() {
    let connector = Arc::new(CountingConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("pg")).await.unwrap();
    let handler = MetadataHandler::new(registry);

    let folders = handler.get_hierarchy("pg", Some("schema:public")).await.unwrap();
    let ids: Vec<&str> = folders.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "schema:public.folder:tables",
            "schema:public.folder:views",
            "schema:public.folder:functions",
        ]
    );
    assert!(folders.iter().all(|f| f.kind == ObjectKind::Folder && f.has_children));
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_leaf_nodes_return_nothing() {
    let connector = Arc::new(CountingConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("pg")).await.unwrap();
    let handler = MetadataHandler::new(registry);

    let children = handler
        .get_hierarchy("pg", Some("schema:public.folder:tables.table:orders"))
        .await
        .unwrap();
    assert!(children.is_empty());
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_unknown_connection() {
    let registry = Arc::new(PoolRegistry::new(Arc::new(CountingConnector::default())));
    let handler = MetadataHandler::new(registry);
    assert!(handler.get_hierarchy("nope", None).await.is_err());
}
