//! Health checks of the source, target and local database.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mdmsync_connector::{SourceConnector, TargetConnector};
use mdmsync_db::DbPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::ReconciliationEngine;
use crate::status::RunState;

/// Configuration for health checks.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Upper bound of each component check (in seconds).
    pub check_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one component check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    /// Critical components make the whole report unhealthy.
    pub critical: bool,
    pub message: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub version: String,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Overall status: unhealthy when a critical component is unhealthy,
/// degraded when anything else is not healthy.
#[must_use]
pub fn overall_status(components: &[ComponentHealth]) -> HealthStatus {
    if components
        .iter()
        .any(|c| c.critical && c.status == HealthStatus::Unhealthy)
    {
        return HealthStatus::Unhealthy;
    }
    if components.iter().any(|c| c.status != HealthStatus::Healthy) {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

/// Probes every dependency of the engine.
pub struct HealthChecker {
    source: Arc<dyn SourceConnector>,
    target: Arc<dyn TargetConnector>,
    db: DbPool,
    engine: Option<Arc<ReconciliationEngine>>,
    config: HealthConfig,
    started_at: Instant,
}

impl HealthChecker {
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceConnector>,
        target: Arc<dyn TargetConnector>,
        db: DbPool,
    ) -> Self {
        Self::with_config(source, target, db, HealthConfig::default())
    }

    #[must_use]
    pub fn with_config(
        source: Arc<dyn SourceConnector>,
        target: Arc<dyn TargetConnector>,
        db: DbPool,
        config: HealthConfig,
    ) -> Self {
        Self {
            source,
            target,
            db,
            engine: None,
            config,
            started_at: Instant::now(),
        }
    }

    /// Also report the state of the latest sync run.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<ReconciliationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Probe all components concurrently.
    pub async fn check(&self) -> HealthReport {
        let (source, target, database, sync) = tokio::join!(
            self.check_source(),
            self.check_target(),
            self.check_database(),
            self.check_sync(),
        );

        let mut components = vec![source, target, database];
        components.extend(sync);
        let status = overall_status(&components);

        if status == HealthStatus::Healthy {
            debug!("Health check passed");
        } else {
            warn!(status = %status, "Health check found problems");
        }

        HealthReport {
            status,
            components,
            checked_at: Utc::now(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn check_source(&self) -> ComponentHealth {
        let source = Arc::clone(&self.source);
        self.timed_check("source", true, async move {
            source
                .test_connection()
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(match source.count_devices(None).await {
                Ok(count) => (
                    HealthStatus::Healthy,
                    format!("{} reachable, {count} devices", source.display_name()),
                ),
                Err(e) => (
                    HealthStatus::Degraded,
                    format!("{} reachable but listing failed: {e}", source.display_name()),
                ),
            })
        })
        .await
    }

    async fn check_target(&self) -> ComponentHealth {
        let target = Arc::clone(&self.target);
        self.timed_check("target", true, async move {
            target
                .test_connection()
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>((
                HealthStatus::Healthy,
                format!("{} reachable", target.display_name()),
            ))
        })
        .await
    }

    async fn check_database(&self) -> ComponentHealth {
        let db = self.db.clone();
        self.timed_check("database", true, async move {
            db.ping().await.map_err(|e| e.to_string())?;
            Ok::<_, String>((
                HealthStatus::Healthy,
                format!("database reachable, schema v{}", mdmsync_db::latest_version()),
            ))
        })
        .await
    }

    async fn check_sync(&self) -> Option<ComponentHealth> {
        let engine = Arc::clone(self.engine.as_ref()?);
        let component = self
            .timed_check("sync", false, async move {
                let status = engine.sync_status().await.map_err(|e| e.to_string())?;
                Ok::<_, String>(match status.last_run {
                    None => (HealthStatus::Healthy, "no run recorded yet".to_string()),
                    Some(last) => {
                        let health = match last.state {
                            RunState::Success | RunState::InProgress => HealthStatus::Healthy,
                            RunState::Failed => HealthStatus::Degraded,
                            RunState::Stale => HealthStatus::Unknown,
                        };
                        (
                            health,
                            format!("last {} run {}", last.run.mode, last.state),
                        )
                    }
                })
            })
            .await;
        Some(component)
    }

    async fn timed_check<F>(&self, name: &str, critical: bool, check: F) -> ComponentHealth
    where
        F: Future<Output = Result<(HealthStatus, String), String>>,
    {
        let timeout = Duration::from_secs(self.config.check_timeout_secs);
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, check).await;
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, message) = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(message)) => (HealthStatus::Unhealthy, message),
            Err(_) => (
                HealthStatus::Unhealthy,
                format!("no answer within {}s", self.config.check_timeout_secs),
            ),
        };

        ComponentHealth {
            name: name.to_string(),
            status,
            critical,
            message,
            response_time_ms,
        }
    }
}
