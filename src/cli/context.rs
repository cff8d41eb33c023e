use std::sync::Arc;

use anyhow::Context;

use crate::config::{config, AppConfig};
use crate::database::bootstrap::{bootstrap, resolve_catalog};
use crate::database::{DatabaseManager, PartitionRouter, PgPartitionBackend, PgTenantStore};
use crate::services::TenantService;

/// Direct database access for operator commands. The CLI works against the
/// same shared area and partitions the server does, without going over HTTP.
pub struct ControlPlane {
    pub db: DatabaseManager,
    pub router: Arc<PartitionRouter<PgPartitionBackend>>,
    pub service: TenantService,
}

impl ControlPlane {
    pub async fn connect() -> anyhow::Result<Self> {
        let config = config();
        Self::connect_with(config).await
    }

    pub async fn connect_with(config: &AppConfig) -> anyhow::Result<Self> {
        let database_url = DatabaseManager::database_url_from_env()?;
        let db = DatabaseManager::connect(&database_url, &config.database)
            .await
            .context("failed to connect to the shared database")?;
        bootstrap(db.main_pool()).await.context("failed to prepare the shared area")?;
        let catalog = resolve_catalog(db.main_pool(), config.tenancy.catalog_path.as_deref())
            .await
            .context("failed to load the plan catalog")?;

        let router = Arc::new(PartitionRouter::new(db.partition_backend()));
        let store = Arc::new(PgTenantStore::new(db.main_pool().clone()));
        let service = TenantService::new(store, router.clone(), Arc::new(catalog));

        Ok(Self { db, router, service })
    }

    pub async fn shutdown(self) {
        self.router.close_all().await;
        self.db.close().await;
    }
}
