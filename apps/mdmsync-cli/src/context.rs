//! Wiring of connectors, database and engine for one process.

use std::sync::Arc;

use mdmsync_connector_rest::{GlpiConnector, MdmConnector};
use mdmsync_db::{run_migrations, DbPool};
use mdmsync_sync::{HealthChecker, ReconciliationEngine, SqliteStore};
use tracing::info;

use crate::config::AppConfig;
use crate::error::CliResult;

pub struct AppContext {
    pub config: AppConfig,
    pub pool: DbPool,
    pub source: Arc<MdmConnector>,
    pub target: Arc<GlpiConnector>,
    pub engine: Arc<ReconciliationEngine>,
}

impl AppContext {
    /// Open the database, apply migrations and build the engine.
    ///
    /// No remote call is made here; connectivity is checked when a run starts.
    pub async fn build(config: AppConfig) -> CliResult<Self> {
        let source = Arc::new(MdmConnector::new(config.mdm.clone())?);
        let target = Arc::new(GlpiConnector::new(config.glpi.clone())?);

        let pool =
            DbPool::connect_with(&config.database_url, config.database_max_connections).await?;
        run_migrations(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let engine = Arc::new(ReconciliationEngine::new(
            source.clone(),
            target.clone(),
            store.clone(),
            store,
            config.sync.clone(),
        )?);

        info!(
            source = %config.mdm.base_url,
            target = %config.glpi.base_url,
            "Reconciliation engine ready"
        );

        Ok(Self {
            config,
            pool,
            source,
            target,
            engine,
        })
    }

    #[must_use]
    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::with_config(
            self.source.clone(),
            self.target.clone(),
            self.pool.clone(),
            self.config.health.clone(),
        )
        .with_engine(self.engine.clone())
    }

    /// Close the GLPI session and the pool.
    pub async fn shutdown(&self) {
        self.engine.close().await;
        self.pool.close().await;
    }
}
