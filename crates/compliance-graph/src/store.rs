//! Connection handling for the compliance graph store

use std::collections::BTreeSet;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::GraphConfig;
use crate::error::Result;
use crate::schema;

/// Handle to the graph store.
///
/// Cheap to clone; all clones share one connection pool and one immutable
/// copy of the marketplace reference data.
#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
    op_timeout: Duration,
    marketplaces: Arc<BTreeSet<String>>,
}

impl GraphStore {
    /// Open the store, run migrations and load reference data
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        tracing::info!("Connecting to database: {}", config.database_url);

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.op_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.op_timeout)
            .connect_with(options)
            .await?;

        schema::migrate(&pool).await?;
        schema::provision_marketplaces(&pool, &config.marketplaces).await?;
        let marketplaces = schema::load_marketplaces(&pool).await?;

        tracing::info!(
            "Compliance graph ready ({} marketplaces: {:?})",
            marketplaces.len(),
            marketplaces
        );

        Ok(Self {
            pool,
            op_timeout: config.op_timeout,
            marketplaces: Arc::new(marketplaces),
        })
    }

    /// Marketplace codes loaded at start-up
    pub fn marketplaces(&self) -> &BTreeSet<String> {
        &self.marketplaces
    }

    pub fn has_marketplace(&self, code: &str) -> bool {
        self.marketplaces.contains(code)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a store operation under the configured timeout
    pub(crate) async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.op_timeout, op).await?
    }
}
