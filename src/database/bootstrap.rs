use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::manager::DatabaseError;
use super::models::plan::{ModuleDefinition, Quotas, SubscriptionPlan};
use crate::catalog::{CatalogError, PlanCatalog};

/// Serialises concurrent bootstraps from several processes.
const BOOTSTRAP_LOCK_KEY: i64 = 0x6f72_6770_6c61_6e65;

const SHARED_AREA_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS module_definitions (
        name            TEXT PRIMARY KEY,
        display_name    TEXT NOT NULL,
        description     TEXT,
        is_core         BOOLEAN NOT NULL DEFAULT FALSE,
        dependencies    JSONB NOT NULL DEFAULT '[]',
        permissions     JSONB NOT NULL DEFAULT '[]',
        features        JSONB NOT NULL DEFAULT '[]',
        sort_order      INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS subscription_plans (
        id              BIGSERIAL PRIMARY KEY,
        name            TEXT NOT NULL,
        plan_type       TEXT NOT NULL UNIQUE,
        description     TEXT,
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        sort_order      INTEGER NOT NULL DEFAULT 0,
        monthly_price   NUMERIC(10, 2) NOT NULL DEFAULT 0,
        yearly_price    NUMERIC(10, 2) NOT NULL DEFAULT 0,
        currency        TEXT NOT NULL DEFAULT 'USD',
        max_users       INTEGER NOT NULL,
        max_employees   INTEGER NOT NULL,
        max_storage_gb  INTEGER NOT NULL,
        enabled_modules JSONB NOT NULL DEFAULT '[]',
        feature_flags   JSONB NOT NULL DEFAULT '{}',
        trial_days      INTEGER NOT NULL DEFAULT 0,
        support_tier    TEXT NOT NULL DEFAULT 'basic'
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id                   BIGSERIAL PRIMARY KEY,
        name                 TEXT NOT NULL,
        slug                 TEXT NOT NULL,
        domain               TEXT,
        subdomain            TEXT,
        contact_email        TEXT NOT NULL,
        contact_phone        TEXT,
        company_name         TEXT,
        company_size         TEXT,
        industry             TEXT,
        website              TEXT,
        timezone             TEXT NOT NULL DEFAULT 'UTC',
        locale               TEXT NOT NULL DEFAULT 'en-US',
        currency             TEXT NOT NULL DEFAULT 'USD',
        status               TEXT NOT NULL,
        plan                 TEXT NOT NULL,
        billing_cycle        TEXT NOT NULL DEFAULT 'monthly',
        trial_ends_at        TIMESTAMPTZ,
        subscription_ends_at TIMESTAMPTZ,
        max_users            INTEGER NOT NULL,
        max_employees        INTEGER NOT NULL,
        max_storage_gb       INTEGER NOT NULL,
        current_users        INTEGER NOT NULL DEFAULT 0,
        current_employees    INTEGER NOT NULL DEFAULT 0,
        current_storage_gb   NUMERIC(14, 3) NOT NULL DEFAULT 0,
        enabled_modules      JSONB NOT NULL DEFAULT '[]',
        feature_flags        JSONB NOT NULL DEFAULT '{}',
        monthly_rate         NUMERIC(10, 2) NOT NULL DEFAULT 0,
        support_tier         TEXT NOT NULL DEFAULT 'basic',
        custom_fields        JSONB NOT NULL DEFAULT '{}',
        notes                TEXT,
        created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
        deleted_at           TIMESTAMPTZ,
        CONSTRAINT tenants_slug_key UNIQUE (slug)
    )"#,
    "CREATE INDEX IF NOT EXISTS tenants_status_idx ON tenants (status) WHERE deleted_at IS NULL",
    r#"
    CREATE TABLE IF NOT EXISTS tenant_users (
        id               UUID PRIMARY KEY,
        tenant_id        BIGINT NOT NULL REFERENCES tenants (id),
        username         TEXT NOT NULL,
        email            TEXT NOT NULL,
        credential_hash  TEXT NOT NULL,
        first_name       TEXT NOT NULL,
        last_name        TEXT NOT NULL,
        is_active        BOOLEAN NOT NULL DEFAULT TRUE,
        is_tenant_admin  BOOLEAN NOT NULL DEFAULT FALSE,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT tenant_users_email_key UNIQUE (email)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_roles (
        id          BIGSERIAL PRIMARY KEY,
        tenant_id   BIGINT NOT NULL REFERENCES tenants (id),
        name        TEXT NOT NULL,
        permissions JSONB NOT NULL DEFAULT '{}',
        CONSTRAINT tenant_roles_tenant_name_key UNIQUE (tenant_id, name)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_user_roles (
        user_id UUID NOT NULL REFERENCES tenant_users (id),
        role_id BIGINT NOT NULL REFERENCES tenant_roles (id),
        PRIMARY KEY (user_id, role_id)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_subscription_history (
        id           BIGSERIAL PRIMARY KEY,
        tenant_id    BIGINT NOT NULL REFERENCES tenants (id),
        old_plan     TEXT NOT NULL,
        new_plan     TEXT NOT NULL,
        reason       TEXT,
        initiated_by TEXT,
        changed_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS tenant_subscription_history_tenant_idx ON tenant_subscription_history (tenant_id, changed_at)",
    r#"
    CREATE TABLE IF NOT EXISTS tenant_usage_logs (
        id            BIGSERIAL PRIMARY KEY,
        tenant_id     BIGINT NOT NULL REFERENCES tenants (id),
        log_date      DATE NOT NULL,
        resource_type TEXT NOT NULL,
        resource_id   TEXT,
        action        TEXT NOT NULL,
        quantity      NUMERIC(14, 3) NOT NULL DEFAULT 1,
        metadata      JSONB NOT NULL DEFAULT '{}',
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS tenant_usage_logs_tenant_idx ON tenant_usage_logs (tenant_id, created_at)",
];

/// Create the shared-area tables if they are missing.
pub async fn bootstrap(pool: &PgPool) -> Result<(), DatabaseError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(BOOTSTRAP_LOCK_KEY)
        .execute(&mut *tx)
        .await?;
    for ddl in SHARED_AREA_DDL {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!("Shared area ready");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub modules_inserted: u64,
    pub plans_inserted: u64,
}

/// Write catalog entries that are not present yet. Existing rows are left
/// untouched so administrative edits survive restarts.
pub async fn seed_catalog(pool: &PgPool, catalog: &PlanCatalog) -> Result<SeedReport, DatabaseError> {
    let mut report = SeedReport::default();
    let mut tx = pool.begin().await?;

    for module in catalog.modules() {
        let result = sqlx::query(
            r#"
            INSERT INTO module_definitions
                (name, display_name, description, is_core, dependencies, permissions, features, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&module.name)
        .bind(&module.display_name)
        .bind(&module.description)
        .bind(module.is_core)
        .bind(Json(&module.dependencies))
        .bind(Json(&module.permissions))
        .bind(Json(&module.features))
        .bind(module.sort_order)
        .execute(&mut *tx)
        .await?;
        report.modules_inserted += result.rows_affected();
    }

    for plan in catalog.all_plans() {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_plans
                (name, plan_type, description, is_active, sort_order, monthly_price, yearly_price,
                 currency, max_users, max_employees, max_storage_gb, enabled_modules, feature_flags,
                 trial_days, support_tier)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (plan_type) DO NOTHING
            "#,
        )
        .bind(&plan.name)
        .bind(plan.plan_type.as_str())
        .bind(&plan.description)
        .bind(plan.is_active)
        .bind(plan.sort_order)
        .bind(plan.monthly_price)
        .bind(plan.yearly_price)
        .bind(&plan.currency)
        .bind(plan.quotas.max_users)
        .bind(plan.quotas.max_employees)
        .bind(plan.quotas.max_storage_gb)
        .bind(Json(&plan.enabled_modules))
        .bind(Json(&plan.feature_flags))
        .bind(plan.trial_days as i32)
        .bind(&plan.support_tier)
        .execute(&mut *tx)
        .await?;
        report.plans_inserted += result.rows_affected();
    }

    tx.commit().await?;
    info!(
        modules = report.modules_inserted,
        plans = report.plans_inserted,
        "Seeded plan catalog"
    );
    Ok(report)
}

#[derive(FromRow)]
struct ModuleRow {
    name: String,
    display_name: String,
    description: Option<String>,
    is_core: bool,
    dependencies: Json<Vec<String>>,
    permissions: Json<Vec<String>>,
    features: Json<Vec<String>>,
    sort_order: i32,
}

#[derive(FromRow)]
struct PlanRow {
    name: String,
    plan_type: String,
    description: Option<String>,
    is_active: bool,
    sort_order: i32,
    monthly_price: Decimal,
    yearly_price: Decimal,
    currency: String,
    max_users: i32,
    max_employees: i32,
    max_storage_gb: i32,
    enabled_modules: Json<BTreeSet<String>>,
    feature_flags: Json<BTreeMap<String, bool>>,
    trial_days: i32,
    support_tier: String,
}

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = CatalogError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionPlan {
            name: row.name,
            plan_type: row.plan_type.parse().map_err(CatalogError::Store)?,
            description: row.description,
            is_active: row.is_active,
            sort_order: row.sort_order,
            monthly_price: row.monthly_price,
            yearly_price: row.yearly_price,
            currency: row.currency,
            quotas: Quotas {
                max_users: row.max_users,
                max_employees: row.max_employees,
                max_storage_gb: row.max_storage_gb,
            },
            enabled_modules: row.enabled_modules.0,
            feature_flags: row.feature_flags.0,
            trial_days: u32::try_from(row.trial_days)
                .map_err(|_| CatalogError::Store(format!("negative trial_days for plan {}", row.plan_type)))?,
            support_tier: row.support_tier,
        })
    }
}

/// Read the catalog back from the shared area. Returns `None` when the
/// catalog tables are empty.
pub async fn load_catalog(pool: &PgPool) -> Result<Option<PlanCatalog>, CatalogError> {
    let store_err = |e: sqlx::Error| CatalogError::Store(e.to_string());

    let modules: Vec<ModuleRow> = sqlx::query_as("SELECT * FROM module_definitions ORDER BY sort_order, name")
        .fetch_all(pool)
        .await
        .map_err(store_err)?;
    let plans: Vec<PlanRow> = sqlx::query_as("SELECT * FROM subscription_plans ORDER BY sort_order, id")
        .fetch_all(pool)
        .await
        .map_err(store_err)?;

    if modules.is_empty() && plans.is_empty() {
        return Ok(None);
    }

    let modules = modules
        .into_iter()
        .map(|m| ModuleDefinition {
            name: m.name,
            display_name: m.display_name,
            description: m.description,
            is_core: m.is_core,
            dependencies: m.dependencies.0,
            permissions: m.permissions.0,
            features: m.features.0,
            sort_order: m.sort_order,
        })
        .collect();
    let plans = plans
        .into_iter()
        .map(SubscriptionPlan::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    PlanCatalog::from_parts(modules, plans).map(Some)
}

/// Catalog for a running process: the YAML file when one is configured,
/// otherwise the stored catalog, otherwise the built-in one, which is
/// seeded on the way.
pub async fn resolve_catalog(pool: &PgPool, path: Option<&Path>) -> Result<PlanCatalog, CatalogError> {
    if let Some(path) = path {
        let catalog = PlanCatalog::from_yaml_file(path)?;
        info!(path = %path.display(), "Loaded plan catalog from file");
        return Ok(catalog);
    }
    if let Some(catalog) = load_catalog(pool).await? {
        return Ok(catalog);
    }

    let catalog = PlanCatalog::defaults();
    let report = seed_catalog(pool, &catalog)
        .await
        .map_err(|e| CatalogError::Store(e.to_string()))?;
    info!(
        modules = report.modules_inserted,
        plans = report.plans_inserted,
        "Seeded built-in plan catalog"
    );
    Ok(catalog)
}
