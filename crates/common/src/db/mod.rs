//! Database layer for ChatForge
//!
//! Provides:
//! - SeaORM entity models
//! - Conversation store over one SQLite database per tenant
//! - Lazy, cached per-tenant connection pools

pub mod models;
mod repository;

pub use models::{ChatRecord, InquiryRecord};
pub use repository::ConversationStore;

use crate::config::{StorageConfig, TenantConfig};
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

/// Per-tenant connection pools, opened on first use
#[derive(Clone)]
pub struct TenantDatabases {
    pools: Arc<Mutex<HashMap<String, Arc<OnceCell<DatabaseConnection>>>>>,
    max_connections: u32,
    connect_timeout: Duration,
}

impl TenantDatabases {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            pools: Arc::new(Mutex::new(HashMap::new())),
            max_connections: config.max_connections.max(1),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    /// Connection for a tenant, creating the database and schema if needed.
    ///
    /// A failed open is not cached, so the next call tries again.
    pub async fn connection(&self, tenant: &TenantConfig) -> Result<DatabaseConnection> {
        let cell = {
            let mut pools = self.pools.lock().await;
            pools
                .entry(tenant.tenant_id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let conn = cell.get_or_try_init(|| self.open(tenant)).await?;
        Ok(conn.clone())
    }

    async fn open(&self, tenant: &TenantConfig) -> Result<DatabaseConnection> {
        tokio::fs::create_dir_all(&tenant.storage_location)
            .await
            .map_err(|e| AppError::StorageConnection {
                message: format!(
                    "Cannot create storage for {} at {}: {}",
                    tenant.tenant_id,
                    tenant.storage_location.display(),
                    e
                ),
            })?;

        let path = tenant.database_path();
        let url = format!("sqlite://{}?mode=rwc", path.display());

        info!(tenant_id = %tenant.tenant_id, path = %path.display(), "Opening tenant database");

        let mut opts = ConnectOptions::new(url);
        opts
            .max_connections(self.max_connections)
            .min_connections(1)
            .connect_timeout(self.connect_timeout)
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::StorageConnection {
                message: format!("Failed to open {}: {}", path.display(), e),
            })?;

        conn.execute_unprepared("PRAGMA journal_mode=WAL").await?;
        for statement in models::SCHEMA {
            conn.execute_unprepared(statement).await?;
        }

        Ok(conn)
    }

    /// Ping a tenant database to check connectivity
    pub async fn ping(&self, tenant: &TenantConfig) -> Result<()> {
        self.connection(tenant)
            .await?
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::StorageConnection {
                message: format!("Ping failed for {}: {}", tenant.tenant_id, e),
            })?;
        Ok(())
    }
}
