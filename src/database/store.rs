use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::ledger::{PlanChange, SubscriptionHistory, UsageEvent, UsageLog};
use super::models::plan::PlanType;
use super::models::principal::{AdminPrincipal, Principal, Role, RoleTemplate};
use super::models::tenant::{NewTenant, Tenant, TenantStatus};
use super::partition::PartitionName;
use crate::services::TenantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Slug,
    AdminEmail,
}

/// Errors from the tenant metadata store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate {0:?}")]
    Duplicate(DuplicateKind),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Everything written by the tenant-creation transaction.
#[derive(Debug, Clone)]
pub struct TenantProvision {
    pub tenant: NewTenant,
    pub admin: AdminPrincipal,
    pub roles: Vec<RoleTemplate>,
    pub created_event: UsageEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub admin: Principal,
    pub roles: Vec<Role>,
}

/// Ledger rows to append in the same unit of work as a tenant update.
#[derive(Debug, Clone, Default)]
pub struct MutationEffects {
    pub history: Option<PlanChange>,
    pub usage: Option<UsageEvent>,
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub tenant: Tenant,
    pub history: Option<SubscriptionHistory>,
    pub usage: Option<UsageLog>,
}

/// Applied to the locked tenant row. Returning an error aborts the whole
/// unit of work.
pub type TenantMutation = Box<dyn FnOnce(&mut Tenant) -> Result<MutationEffects, TenantError> + Send>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantFilter {
    #[serde(default)]
    pub status: Option<TenantStatus>,
    #[serde(default)]
    pub plan: Option<PlanType>,
    /// Case-insensitive match on name, slug, contact email or company name.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl TenantFilter {
    pub fn matches(&self, tenant: &Tenant) -> bool {
        if tenant.is_deleted() && !self.include_deleted {
            return false;
        }
        if self.status.is_some_and(|s| s != tenant.status) {
            return false;
        }
        if self.plan.is_some_and(|p| p != tenant.plan) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                tenant.name.to_lowercase().contains(&term)
                    || tenant.slug.contains(&term)
                    || tenant.contact_email.contains(&term)
                    || tenant
                        .company_name
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32, max_size: u32) -> Result<Self, String> {
        if page < 1 {
            return Err("page must be at least 1".to_string());
        }
        if size < 1 || size > max_size {
            return Err(format!("size must be between 1 and {}", max_size));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let size = u64::from(request.size);
        Self {
            items,
            total,
            page: request.page,
            size: request.size,
            pages: total.div_ceil(size),
        }
    }
}

/// Shared-area persistence for tenants, principals and the ledgers.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// True when any tenant row, deleted or not, owns `slug`.
    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError>;

    async fn admin_email_taken(&self, email: &str) -> Result<bool, StoreError>;

    /// Insert the tenant, its admin principal, default roles and the
    /// creation usage event atomically.
    async fn insert_tenant(&self, provision: TenantProvision) -> Result<ProvisionedTenant, StoreError>;

    async fn find_tenant(&self, id: i64) -> Result<Option<Tenant>, StoreError>;

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError>;

    /// Lock the row, apply `mutation`, then persist the row and its
    /// effects in one transaction.
    async fn update_tenant(&self, id: i64, mutation: TenantMutation) -> Result<MutationOutcome, TenantError>;

    /// Newest first.
    async fn list_tenants(&self, filter: &TenantFilter, page: &PageRequest) -> Result<(Vec<Tenant>, u64), StoreError>;

    /// Every slug with a tenant row, including soft-deleted ones.
    async fn tenant_slugs(&self) -> Result<BTreeSet<String>, StoreError>;

    async fn trial_tenants_ending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, StoreError>;

    async fn count_active_users(&self, tenant_id: i64) -> Result<i64, StoreError>;

    /// Active employees in the tenant partition. A partition without an
    /// employees table counts as zero.
    async fn count_active_employees(&self, partition: &PartitionName) -> Result<i64, StoreError>;

    async fn append_usage(&self, tenant_id: i64, event: UsageEvent) -> Result<UsageLog, StoreError>;

    /// Oldest first.
    async fn subscription_history(&self, tenant_id: i64) -> Result<Vec<SubscriptionHistory>, StoreError>;

    /// Newest first.
    async fn usage_logs(&self, tenant_id: i64, limit: i64) -> Result<Vec<UsageLog>, StoreError>;
}
