//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlbridge::db::{DbPool, PoolConnector};
use sqlbridge::error::{DbError, DbResult};
use sqlbridge::models::{ConnectionDefinition, EngineFamily};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Connector that hands out lazy, never-connected pools and counts calls.
#[derive(Default)]
pub struct CountingConnector {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// Slows every connect so concurrent callers overlap
    pub connect_delay: Option<Duration>,
    /// Close calls numbered below this fail
    pub failing_closes: usize,
}

impl CountingConnector {
    pub fn slow(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolConnector for CountingConnector {
    async fn connect(
        &self,
        _def: &ConnectionDefinition,
        _database: Option<&str>,
    ) -> DbResult<DbPool> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(DbPool::Postgres(
            PgPoolOptions::new().connect_lazy_with(PgConnectOptions::new()),
        ))
    }

    async fn close(&self, pool: DbPool) -> DbResult<()> {
        let n = self.closes.fetch_add(1, Ordering::SeqCst);
        if n < self.failing_closes {
            return Err(DbError::internal("close failed"));
        }
        pool.close().await;
        Ok(())
    }
}

/// Connector whose first connect parks until [`GatedConnector::release`],
/// recording the database every pool was built for.
#[derive(Default)]
pub struct GatedConnector {
    built_for: Mutex<Vec<Option<String>>>,
    closes: AtomicUsize,
    gate_taken: AtomicBool,
    entered: Notify,
    gate: Notify,
}

impl GatedConnector {
    /// Wait until the first connect is parked.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn built_for(&self) -> Vec<Option<String>> {
        self.built_for.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolConnector for GatedConnector {
    async fn connect(
        &self,
        _def: &ConnectionDefinition,
        database: Option<&str>,
    ) -> DbResult<DbPool> {
        self.built_for
            .lock()
            .unwrap()
            .push(database.map(String::from));
        if !self.gate_taken.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(DbPool::Postgres(
            PgPoolOptions::new().connect_lazy_with(PgConnectOptions::new()),
        ))
    }

    async fn close(&self, pool: DbPool) -> DbResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        pool.close().await;
        Ok(())
    }
}

pub fn postgres_def(id: &str) -> ConnectionDefinition {
    ConnectionDefinition::new(id, EngineFamily::Postgres, "localhost")
        .unwrap()
        .with_database("app")
}
