use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::error;
use uuid::Uuid;

use super::models::ledger::{SubscriptionHistory, UsageEvent, UsageLog};
use super::models::plan::Quotas;
use super::models::principal::{Principal, Role};
use super::models::tenant::{Tenant, UsageCounters};
use super::partition::PartitionName;
use super::store::{
    DuplicateKind, MutationOutcome, PageRequest, ProvisionedTenant, StoreError, TenantFilter, TenantMutation,
    TenantProvision, TenantStore,
};
use crate::services::TenantError;

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                match db.constraint() {
                    Some("tenants_slug_key") => StoreError::Duplicate(DuplicateKind::Slug),
                    Some("tenant_users_email_key") => StoreError::Duplicate(DuplicateKind::AdminEmail),
                    _ => StoreError::Database(db.to_string()),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => {
                error!("Tenant store query failed: {}", other);
                StoreError::Database(other.to_string())
            }
        }
    }
}

#[derive(FromRow)]
struct TenantRow {
    id: i64,
    name: String,
    slug: String,
    domain: Option<String>,
    subdomain: Option<String>,
    contact_email: String,
    contact_phone: Option<String>,
    company_name: Option<String>,
    company_size: Option<String>,
    industry: Option<String>,
    website: Option<String>,
    timezone: String,
    locale: String,
    currency: String,
    status: String,
    plan: String,
    billing_cycle: String,
    trial_ends_at: Option<DateTime<Utc>>,
    subscription_ends_at: Option<DateTime<Utc>>,
    max_users: i32,
    max_employees: i32,
    max_storage_gb: i32,
    current_users: i32,
    current_employees: i32,
    current_storage_gb: Decimal,
    enabled_modules: Json<BTreeSet<String>>,
    feature_flags: Json<BTreeMap<String, bool>>,
    monthly_rate: Decimal,
    support_tier: String,
    custom_fields: Json<BTreeMap<String, Value>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::Corrupt(format!("tenant {}: {}", row.id, e));
        Ok(Tenant {
            id: row.id,
            status: row.status.parse().map_err(corrupt)?,
            plan: row.plan.parse().map_err(corrupt)?,
            billing_cycle: row.billing_cycle.parse().map_err(corrupt)?,
            name: row.name,
            slug: row.slug,
            domain: row.domain,
            subdomain: row.subdomain,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            company_name: row.company_name,
            company_size: row.company_size,
            industry: row.industry,
            website: row.website,
            timezone: row.timezone,
            locale: row.locale,
            currency: row.currency,
            trial_ends_at: row.trial_ends_at,
            subscription_ends_at: row.subscription_ends_at,
            quotas: Quotas {
                max_users: row.max_users,
                max_employees: row.max_employees,
                max_storage_gb: row.max_storage_gb,
            },
            usage: UsageCounters {
                current_users: row.current_users,
                current_employees: row.current_employees,
                current_storage_gb: row.current_storage_gb,
            },
            enabled_modules: row.enabled_modules.0,
            feature_flags: row.feature_flags.0,
            monthly_rate: row.monthly_rate,
            support_tier: row.support_tier,
            custom_fields: row.custom_fields.0,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct HistoryRow {
    id: i64,
    tenant_id: i64,
    old_plan: String,
    new_plan: String,
    reason: Option<String>,
    initiated_by: Option<String>,
    changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for SubscriptionHistory {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionHistory {
            id: row.id,
            tenant_id: row.tenant_id,
            old_plan: row.old_plan.parse().map_err(StoreError::Corrupt)?,
            new_plan: row.new_plan.parse().map_err(StoreError::Corrupt)?,
            reason: row.reason,
            initiated_by: row.initiated_by,
            changed_at: row.changed_at,
        })
    }
}

#[derive(FromRow)]
struct UsageRow {
    id: i64,
    tenant_id: i64,
    log_date: NaiveDate,
    resource_type: String,
    resource_id: Option<String>,
    action: String,
    quantity: Decimal,
    metadata: Json<Value>,
    created_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageLog {
    fn from(row: UsageRow) -> Self {
        UsageLog {
            id: row.id,
            tenant_id: row.tenant_id,
            log_date: row.log_date,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            action: row.action,
            quantity: row.quantity,
            metadata: row.metadata.0,
            created_at: row.created_at,
        }
    }
}

/// [`TenantStore`] over the shared-area tables.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_usage<'e, E>(executor: E, tenant_id: i64, event: UsageEvent) -> Result<UsageLog, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let row: UsageRow = sqlx::query_as(
            r#"
            INSERT INTO tenant_usage_logs
                (tenant_id, log_date, resource_type, resource_id, action, quantity, metadata)
            VALUES ($1, CURRENT_DATE, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(event.resource_type)
        .bind(event.resource_id)
        .bind(event.action)
        .bind(event.quantity)
        .bind(Json(event.metadata))
        .fetch_one(executor)
        .await?;
        Ok(row.into())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TenantFilter) {
    qb.push(" WHERE TRUE");
    if !filter.include_deleted {
        qb.push(" AND deleted_at IS NULL");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(plan) = filter.plan {
        qb.push(" AND plan = ").push_bind(plan.as_str());
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{}%", escaped);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR slug ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR contact_email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR company_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError> {
        let taken = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn admin_email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let taken = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenant_users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn insert_tenant(&self, provision: TenantProvision) -> Result<ProvisionedTenant, StoreError> {
        let TenantProvision {
            tenant: new_tenant,
            admin,
            roles: templates,
            created_event,
        } = provision;
        let p = &new_tenant.profile;

        let mut tx = self.pool.begin().await?;

        let (tenant_id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO tenants (
                name, slug, domain, subdomain, contact_email, contact_phone, company_name,
                company_size, industry, website, timezone, locale, currency, status, plan,
                billing_cycle, trial_ends_at, subscription_ends_at, max_users, max_employees,
                max_storage_gb, current_users, current_employees, current_storage_gb,
                enabled_modules, feature_flags, monthly_rate, support_tier, custom_fields, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)
            RETURNING id, created_at
            "#,
        )
        .bind(&p.name)
        .bind(&p.slug)
        .bind(&p.domain)
        .bind(&p.subdomain)
        .bind(&p.contact_email)
        .bind(&p.contact_phone)
        .bind(&p.company_name)
        .bind(&p.company_size)
        .bind(&p.industry)
        .bind(&p.website)
        .bind(&p.timezone)
        .bind(&p.locale)
        .bind(&p.currency)
        .bind(new_tenant.status.as_str())
        .bind(new_tenant.plan.as_str())
        .bind(p.billing_cycle.as_str())
        .bind(new_tenant.trial_ends_at)
        .bind(new_tenant.subscription_ends_at)
        .bind(new_tenant.quotas.max_users)
        .bind(new_tenant.quotas.max_employees)
        .bind(new_tenant.quotas.max_storage_gb)
        .bind(new_tenant.usage.current_users)
        .bind(new_tenant.usage.current_employees)
        .bind(new_tenant.usage.current_storage_gb)
        .bind(Json(&new_tenant.enabled_modules))
        .bind(Json(&new_tenant.feature_flags))
        .bind(new_tenant.monthly_rate)
        .bind(&new_tenant.support_tier)
        .bind(Json(&p.custom_fields))
        .bind(&new_tenant.notes)
        .fetch_one(&mut *tx)
        .await?;

        let admin_id = Uuid::new_v4();
        let admin_created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO tenant_users
                (id, tenant_id, username, email, credential_hash, first_name, last_name, is_active, is_tenant_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, TRUE)
            RETURNING created_at
            "#,
        )
        .bind(admin_id)
        .bind(tenant_id)
        .bind(&admin.username)
        .bind(&admin.email)
        .bind(&admin.credential_hash)
        .bind(&admin.first_name)
        .bind(&admin.last_name)
        .fetch_one(&mut *tx)
        .await?;

        let mut roles = Vec::with_capacity(templates.len());
        for template in templates {
            let role_id: i64 = sqlx::query_scalar(
                "INSERT INTO tenant_roles (tenant_id, name, permissions) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(tenant_id)
            .bind(&template.name)
            .bind(Json(&template.permissions))
            .fetch_one(&mut *tx)
            .await?;
            roles.push(Role {
                id: role_id,
                tenant_id,
                name: template.name,
                permissions: template.permissions,
            });
        }

        if let Some(admin_role) = roles.first() {
            sqlx::query("INSERT INTO tenant_user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(admin_id)
                .bind(admin_role.id)
                .execute(&mut *tx)
                .await?;
        }

        Self::insert_usage(&mut *tx, tenant_id, created_event).await?;

        tx.commit().await?;

        let admin = Principal {
            id: admin_id,
            tenant_id,
            username: admin.username,
            email: admin.email,
            first_name: admin.first_name,
            last_name: admin.last_name,
            is_active: true,
            is_tenant_admin: true,
            created_at: admin_created_at,
        };
        Ok(ProvisionedTenant {
            tenant: new_tenant.into_tenant(tenant_id, created_at),
            admin,
            roles,
        })
    }

    async fn find_tenant(&self, id: i64) -> Result<Option<Tenant>, StoreError> {
        let row: Option<TenantRow> = sqlx::query_as("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Tenant::try_from).transpose()
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError> {
        let row: Option<TenantRow> = sqlx::query_as("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Tenant::try_from).transpose()
    }

    async fn update_tenant(&self, id: i64, mutation: TenantMutation) -> Result<MutationOutcome, TenantError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let row: Option<TenantRow> = sqlx::query_as("SELECT * FROM tenants WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        let mut tenant = Tenant::try_from(row.ok_or_else(|| TenantError::not_found(id))?)?;

        // Dropping `tx` on error rolls the row lock back untouched.
        let effects = mutation(&mut tenant)?;
        tenant.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE tenants SET
                status = $2, plan = $3, billing_cycle = $4, trial_ends_at = $5,
                subscription_ends_at = $6, max_users = $7, max_employees = $8, max_storage_gb = $9,
                current_users = $10, current_employees = $11, current_storage_gb = $12,
                enabled_modules = $13, feature_flags = $14, monthly_rate = $15, support_tier = $16,
                custom_fields = $17, notes = $18, updated_at = $19, deleted_at = $20
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(tenant.status.as_str())
        .bind(tenant.plan.as_str())
        .bind(tenant.billing_cycle.as_str())
        .bind(tenant.trial_ends_at)
        .bind(tenant.subscription_ends_at)
        .bind(tenant.quotas.max_users)
        .bind(tenant.quotas.max_employees)
        .bind(tenant.quotas.max_storage_gb)
        .bind(tenant.usage.current_users)
        .bind(tenant.usage.current_employees)
        .bind(tenant.usage.current_storage_gb)
        .bind(Json(&tenant.enabled_modules))
        .bind(Json(&tenant.feature_flags))
        .bind(tenant.monthly_rate)
        .bind(&tenant.support_tier)
        .bind(Json(&tenant.custom_fields))
        .bind(&tenant.notes)
        .bind(tenant.updated_at)
        .bind(tenant.deleted_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let history = match effects.history {
            Some(change) => {
                let row: HistoryRow = sqlx::query_as(
                    r#"
                    INSERT INTO tenant_subscription_history (tenant_id, old_plan, new_plan, reason, initiated_by)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(change.old_plan.as_str())
                .bind(change.new_plan.as_str())
                .bind(&change.reason)
                .bind(&change.initiated_by)
                .fetch_one(&mut *tx)
                .await
                .map_err(StoreError::from)?;
                Some(SubscriptionHistory::try_from(row)?)
            }
            None => None,
        };

        let usage = match effects.usage {
            Some(event) => Some(
                Self::insert_usage(&mut *tx, id, event)
                    .await
                    .map_err(StoreError::from)?,
            ),
            None => None,
        };

        tx.commit().await.map_err(StoreError::from)?;
        Ok(MutationOutcome { tenant, history, usage })
    }

    async fn list_tenants(&self, filter: &TenantFilter, page: &PageRequest) -> Result<(Vec<Tenant>, u64), StoreError> {
        let mut count = QueryBuilder::new("SELECT count(*) FROM tenants");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT * FROM tenants");
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<TenantRow> = select.build_query_as::<TenantRow>().fetch_all(&self.pool).await?;

        let tenants = rows.into_iter().map(Tenant::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((tenants, total.max(0) as u64))
    }

    async fn tenant_slugs(&self) -> Result<BTreeSet<String>, StoreError> {
        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM tenants")
            .fetch_all(&self.pool)
            .await?;
        Ok(slugs.into_iter().collect())
    }

    async fn trial_tenants_ending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM tenants
            WHERE status = 'trial' AND deleted_at IS NULL AND trial_ends_at IS NOT NULL AND trial_ends_at < $1
            ORDER BY id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_active_users(&self, tenant_id: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar("SELECT count(*) FROM tenant_users WHERE tenant_id = $1 AND is_active")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_active_employees(&self, partition: &PartitionName) -> Result<i64, StoreError> {
        let table = format!("{}.employees", partition.quoted());
        let exists: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(&table)
            .fetch_one(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(0);
        }

        let count = sqlx::query_scalar(&format!(
            "SELECT count(*) FROM {} WHERE employment_status = 'active'",
            table
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn append_usage(&self, tenant_id: i64, event: UsageEvent) -> Result<UsageLog, StoreError> {
        Ok(Self::insert_usage(&self.pool, tenant_id, event).await?)
    }

    async fn subscription_history(&self, tenant_id: i64) -> Result<Vec<SubscriptionHistory>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT * FROM tenant_subscription_history WHERE tenant_id = $1 ORDER BY changed_at, id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SubscriptionHistory::try_from).collect()
    }

    async fn usage_logs(&self, tenant_id: i64, limit: i64) -> Result<Vec<UsageLog>, StoreError> {
        let rows: Vec<UsageRow> = sqlx::query_as(
            "SELECT * FROM tenant_usage_logs WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UsageLog::from).collect())
    }
}
