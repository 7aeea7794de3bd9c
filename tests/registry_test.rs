//! Pool registry behaviour under concurrency and teardown.

mod common;

use common::{CountingConnector, GatedConnector, postgres_def};
use sqlbridge::db::PoolRegistry;
use sqlbridge::error::DbError;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_first_get_creates_one_pool() {
    let connector = Arc::new(CountingConnector::slow(Duration::from_millis(50)));
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("app")).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get("app", None).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(connector.connects(), 1);
    assert_eq!(registry.pool_count().await, 1);
}

#[tokio::test]
async fn test_distinct_databases_get_distinct_pools() {
    let connector = Arc::new(CountingConnector::default());
    let registry = PoolRegistry::new(connector.clone());
    registry.register(postgres_def("app")).await.unwrap();

    registry.get("app", None).await.unwrap();
    registry.get("app", Some("reports")).await.unwrap();
    registry.get("app", Some("reports")).await.unwrap();

    assert_eq!(connector.connects(), 2);
    assert_eq!(registry.pool_count().await, 2);
}

#[tokio::test]
async fn test_remove_all_is_best_effort() {
    let connector = Arc::new(CountingConnector {
        failing_closes: 1,
        ..Default::default()
    });
    let registry = PoolRegistry::new(connector.clone());
    registry.register(postgres_def("app")).await.unwrap();
    registry.register(postgres_def("other")).await.unwrap();

    for db in [None, Some("a"), Some("b")] {
        registry.get("app", db).await.unwrap();
    }
    registry.get("other", None).await.unwrap();

    let closed = registry.remove_all("app").await;
    assert_eq!(closed, 2);
    assert_eq!(connector.closes(), 3);
    // Untouched connection keeps its pool
    assert_eq!(registry.pool_count().await, 1);
}

#[tokio::test]
async fn test_update_closes_existing_pools() {
    let connector = Arc::new(CountingConnector::default());
    let registry = PoolRegistry::new(connector.clone());
    registry.register(postgres_def("app")).await.unwrap();
    registry.get("app", None).await.unwrap();

    registry
        .update(postgres_def("app").with_database("renamed"))
        .await
        .unwrap();
    assert_eq!(connector.closes(), 1);
    assert_eq!(registry.pool_count().await, 0);

    registry.get("app", None).await.unwrap();
    assert_eq!(connector.connects(), 2);
    assert_eq!(
        registry.definition("app").await.unwrap().database.as_deref(),
        Some("renamed")
    );
}

#[tokio::test]
async fn test_update_unknown_connection() {
    let registry = PoolRegistry::new(Arc::new(CountingConnector::default()));
    let err = registry.update(postgres_def("ghost")).await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotFound { .. }));
}

#[tokio::test]
async fn test_remove_forgets_definition() {
    let connector = Arc::new(CountingConnector::default());
    let registry = PoolRegistry::new(connector.clone());
    registry.register(postgres_def("app")).await.unwrap();
    registry.get("app", None).await.unwrap();

    registry.remove("app").await.unwrap();
    assert!(registry.list().await.is_empty());
    assert!(matches!(
        registry.get("app", None).await.unwrap_err(),
        DbError::ConnectionNotFound { .. }
    ));
}

#[tokio::test]
async fn test_close_all_keeps_definitions() {
    let connector = Arc::new(CountingConnector::default());
    let registry = PoolRegistry::new(connector.clone());
    registry.register(postgres_def("a")).await.unwrap();
    registry.register(postgres_def("b")).await.unwrap();
    registry.get("a", None).await.unwrap();
    registry.get("b", None).await.unwrap();

    assert_eq!(registry.close_all().await, 2);
    assert_eq!(registry.pool_count().await, 0);
    assert_eq!(registry.list().await.len(), 2);
}

#[tokio::test]
async fn test_update_during_pool_creation_leaves_no_stale_pool() {
    let connector = Arc::new(GatedConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("app")).await.unwrap();

    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get("app", None).await })
    };
    connector.wait_entered().await;

    registry
        .update(postgres_def("app").with_database("renamed"))
        .await
        .unwrap();
    connector.release();
    pending.await.unwrap().unwrap();

    // The pool built from the old definition is closed, the caller gets a new one
    assert_eq!(
        connector.built_for(),
        vec![Some("app".to_string()), Some("renamed".to_string())]
    );
    assert_eq!(connector.closes(), 1);
    assert_eq!(registry.pool_count().await, 1);
    assert!(!registry.evict("app", Some("app")).await);
    assert!(registry.evict("app", Some("renamed")).await);
}

#[tokio::test]
async fn test_remove_during_pool_creation_leaves_no_pool() {
    let connector = Arc::new(GatedConnector::default());
    let registry = Arc::new(PoolRegistry::new(connector.clone()));
    registry.register(postgres_def("app")).await.unwrap();

    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get("app", None).await })
    };
    connector.wait_entered().await;

    registry.remove("app").await.unwrap();
    connector.release();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotFound { .. }));
    assert_eq!(connector.closes(), 1);
    assert_eq!(registry.pool_count().await, 0);
}
