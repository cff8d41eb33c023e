#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use orgplane::catalog::PlanCatalog;
use orgplane::config::AppConfig;
use orgplane::database::bootstrap::{bootstrap, seed_catalog};
use orgplane::database::models::principal::AdminPrincipal;
use orgplane::database::models::tenant::TenantProfile;
use orgplane::database::{DatabaseManager, PartitionRouter, PgPartitionBackend, PgTenantStore};
use orgplane::services::TenantService;

// CREATE ... IF NOT EXISTS still races on the catalog when test binaries
// bootstrap in parallel.
static BOOTSTRAP: Mutex<()> = Mutex::const_new(());

// expire_trials sweeps every tenant in the database, so tests that depend
// on a tenant staying in TRIAL must not overlap with it.
static SWEEP: Mutex<()> = Mutex::const_new(());

pub async fn exclusive_sweep() -> MutexGuard<'static, ()> {
    SWEEP.lock().await
}

/// Live Postgres fixtures. Tests that need one return early when
/// `DATABASE_URL` is not set.
pub struct PgContext {
    pub db: DatabaseManager,
    pub router: Arc<PartitionRouter<PgPartitionBackend>>,
    pub service: TenantService,
}

impl PgContext {
    pub async fn connect() -> Result<Option<Self>> {
        let _ = dotenvy::dotenv();
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres test");
            return Ok(None);
        };

        let config = AppConfig::development();
        let db = DatabaseManager::connect(&database_url, &config.database)
            .await
            .context("failed to connect to test database")?;

        let catalog = PlanCatalog::defaults();
        {
            let _guard = BOOTSTRAP.lock().await;
            bootstrap(db.main_pool()).await?;
            seed_catalog(db.main_pool(), &catalog).await?;
        }

        let router = Arc::new(PartitionRouter::new(db.partition_backend()));
        let store = Arc::new(PgTenantStore::new(db.main_pool().clone()));
        let service = TenantService::new(store, router.clone(), Arc::new(catalog));
        Ok(Some(Self { db, router, service }))
    }

    pub fn pool(&self) -> &PgPool {
        self.db.main_pool()
    }

    /// Remove every trace of `slug`: rows in the shared area and the partition.
    pub async fn purge(&self, slug: &str) -> Result<()> {
        let pool = self.pool();
        let tenant_id: Option<i64> = sqlx::query_scalar("SELECT id FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await?;

        if let Some(id) = tenant_id {
            sqlx::query(
                "DELETE FROM tenant_user_roles WHERE user_id IN (SELECT id FROM tenant_users WHERE tenant_id = $1)",
            )
            .bind(id)
            .execute(pool)
            .await?;
            for table in [
                "tenant_users",
                "tenant_roles",
                "tenant_subscription_history",
                "tenant_usage_logs",
            ] {
                sqlx::query(&format!("DELETE FROM {} WHERE tenant_id = $1", table))
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
            sqlx::query("DELETE FROM tenants WHERE id = $1").bind(id).execute(pool).await?;
        }

        self.router.drop_partition(slug).await?;
        Ok(())
    }

    pub async fn shutdown(self) {
        self.router.close_all().await;
        self.db.close().await;
    }
}

pub fn unique_slug(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..10])
}

pub fn profile(slug: &str) -> TenantProfile {
    TenantProfile {
        name: format!("{} Inc", slug),
        slug: slug.to_string(),
        contact_email: format!("ops@{}.example.com", slug),
        ..TenantProfile::default()
    }
}

pub fn admin(slug: &str) -> AdminPrincipal {
    AdminPrincipal {
        username: format!("{}-admin", slug),
        email: format!("admin@{}.example.com", slug),
        credential_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
        first_name: "Admin".to_string(),
        last_name: "User".to_string(),
    }
}
