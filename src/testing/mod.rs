//! In-memory doubles for the tenant store and the partition backend.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::models::ledger::{SubscriptionHistory, UsageEvent, UsageLog};
use crate::database::models::principal::{AdminPrincipal, Principal, Role};
use crate::database::models::tenant::{Tenant, TenantProfile, TenantStatus};
use crate::database::partition::{PartitionBackend, PartitionError, PartitionName};
use crate::database::store::{
    DuplicateKind, MutationOutcome, PageRequest, ProvisionedTenant, StoreError, TenantFilter, TenantMutation,
    TenantProvision, TenantStore,
};
use crate::services::TenantError;

pub fn profile(slug: &str) -> TenantProfile {
    TenantProfile {
        name: format!("{} Inc", slug),
        slug: slug.to_string(),
        contact_email: format!("ops@{}.example.com", slug),
        ..Default::default()
    }
}

pub fn admin_principal(slug: &str) -> AdminPrincipal {
    AdminPrincipal {
        username: format!("{}-admin", slug),
        email: format!("admin@{}.example.com", slug),
        credential_hash: "$argon2id$v=19$m=19456,t=2,p=1$test".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Admin".to_string(),
    }
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    tenants: BTreeMap<i64, Tenant>,
    principals: Vec<Principal>,
    roles: Vec<Role>,
    history: Vec<SubscriptionHistory>,
    usage: Vec<UsageLog>,
    employees: HashMap<String, i64>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn log_usage(&mut self, tenant_id: i64, event: UsageEvent, now: DateTime<Utc>) -> UsageLog {
        let log = event.into_log(self.next_id(), tenant_id, now);
        self.usage.push(log.clone());
        log
    }
}

/// Tenant store backed by maps. One mutex stands in for row locks, so
/// every unit of work is serialized.
#[derive(Default)]
pub struct MemoryTenantStore {
    state: Mutex<StoreState>,
    fail_next_insert: AtomicBool,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `insert_tenant` fails as if the database went away.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub async fn set_employee_count(&self, slug: &str, count: i64) {
        self.state.lock().await.employees.insert(slug.to_string(), count);
    }

    pub async fn tenant_count(&self) -> usize {
        self.state.lock().await.tenants.len()
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tenants.values().any(|t| t.slug == slug))
    }

    async fn admin_email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.principals.iter().any(|p| p.email == email))
    }

    async fn insert_tenant(&self, provision: TenantProvision) -> Result<ProvisionedTenant, StoreError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let mut state = self.state.lock().await;
        if state.tenants.values().any(|t| t.slug == provision.tenant.profile.slug) {
            return Err(StoreError::Duplicate(DuplicateKind::Slug));
        }
        if state.principals.iter().any(|p| p.email == provision.admin.email) {
            return Err(StoreError::Duplicate(DuplicateKind::AdminEmail));
        }

        let now = Utc::now();
        let id = state.next_id();
        let tenant = provision.tenant.into_tenant(id, now);

        let admin = Principal {
            id: Uuid::new_v4(),
            tenant_id: id,
            username: provision.admin.username,
            email: provision.admin.email,
            first_name: provision.admin.first_name,
            last_name: provision.admin.last_name,
            is_active: true,
            is_tenant_admin: true,
            created_at: now,
        };

        let mut roles = Vec::new();
        for template in provision.roles {
            roles.push(Role {
                id: state.next_id(),
                tenant_id: id,
                name: template.name,
                permissions: template.permissions,
            });
        }

        state.tenants.insert(id, tenant.clone());
        state.principals.push(admin.clone());
        state.roles.extend(roles.iter().cloned());
        state.log_usage(id, provision.created_event, now);

        Ok(ProvisionedTenant { tenant, admin, roles })
    }

    async fn find_tenant(&self, id: i64) -> Result<Option<Tenant>, StoreError> {
        Ok(self.state.lock().await.tenants.get(&id).cloned())
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tenants.values().find(|t| t.slug == slug).cloned())
    }

    async fn update_tenant(&self, id: i64, mutation: TenantMutation) -> Result<MutationOutcome, TenantError> {
        let mut state = self.state.lock().await;
        let mut tenant = state.tenants.get(&id).cloned().ok_or_else(|| TenantError::not_found(id))?;

        let effects = mutation(&mut tenant)?;
        let now = Utc::now();
        tenant.updated_at = now;
        state.tenants.insert(id, tenant.clone());

        let history = effects.history.map(|change| {
            let row = SubscriptionHistory {
                id: state.next_id(),
                tenant_id: id,
                old_plan: change.old_plan,
                new_plan: change.new_plan,
                reason: change.reason,
                initiated_by: change.initiated_by,
                changed_at: now,
            };
            state.history.push(row.clone());
            row
        });
        let usage = effects.usage.map(|event| state.log_usage(id, event, now));

        Ok(MutationOutcome { tenant, history, usage })
    }

    async fn list_tenants(&self, filter: &TenantFilter, page: &PageRequest) -> Result<(Vec<Tenant>, u64), StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Tenant> = state.tenants.values().filter(|t| filter.matches(t)).collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn tenant_slugs(&self) -> Result<BTreeSet<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tenants.values().map(|t| t.slug.clone()).collect())
    }

    async fn trial_tenants_ending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tenants
            .values()
            .filter(|t| t.status == TenantStatus::Trial && !t.is_deleted())
            .filter(|t| t.trial_ends_at.is_some_and(|end| end < cutoff))
            .map(|t| t.id)
            .collect())
    }

    async fn count_active_users(&self, tenant_id: i64) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .principals
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.is_active)
            .count() as i64)
    }

    async fn count_active_employees(&self, partition: &PartitionName) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.employees.get(partition.slug()).copied().unwrap_or(0))
    }

    async fn append_usage(&self, tenant_id: i64, event: UsageEvent) -> Result<UsageLog, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.log_usage(tenant_id, event, Utc::now()))
    }

    async fn subscription_history(&self, tenant_id: i64) -> Result<Vec<SubscriptionHistory>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.history.iter().filter(|h| h.tenant_id == tenant_id).cloned().collect())
    }

    async fn usage_logs(&self, tenant_id: i64, limit: i64) -> Result<Vec<UsageLog>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .usage
            .iter()
            .rev()
            .filter(|u| u.tenant_id == tenant_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// A pool stand-in that remembers which namespace it was opened for.
#[derive(Debug, Clone)]
pub struct MemoryPool {
    pub id: usize,
    pub partition: String,
    closed: Arc<AtomicBool>,
}

impl MemoryPool {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Partition backend that keeps namespaces in a set and counts every
/// pool construction and DDL call.
#[derive(Default)]
pub struct MemoryPartitionBackend {
    namespaces: std::sync::Mutex<BTreeSet<String>>,
    open_delay: Option<Duration>,
    next_pool: AtomicUsize,
    pools_opened: AtomicUsize,
    pools_closed: AtomicUsize,
    create_calls: AtomicUsize,
    fail_opens: AtomicUsize,
    fail_creates: AtomicUsize,
}

impl MemoryPartitionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow down pool construction so concurrent callers overlap.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.fail_opens.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_creates(&self, count: usize) {
        self.fail_creates.store(count, Ordering::SeqCst);
    }

    pub fn pools_opened(&self) -> usize {
        self.pools_opened.load(Ordering::SeqCst)
    }

    pub fn pools_closed(&self) -> usize {
        self.pools_closed.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PartitionBackend for MemoryPartitionBackend {
    type Pool = MemoryPool;

    async fn create_namespace(&self, partition: &PartitionName) -> Result<(), PartitionError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_creates) {
            return Err(PartitionError::Ddl {
                partition: partition.to_string(),
                message: "permission denied for database".to_string(),
            });
        }
        self.namespaces.lock().unwrap().insert(partition.to_string());
        Ok(())
    }

    async fn drop_namespace(&self, partition: &PartitionName) -> Result<(), PartitionError> {
        self.namespaces.lock().unwrap().remove(partition.as_str());
        Ok(())
    }

    async fn namespace_exists(&self, partition: &PartitionName) -> Result<bool, PartitionError> {
        Ok(self.namespaces.lock().unwrap().contains(partition.as_str()))
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, PartitionError> {
        Ok(self.namespaces.lock().unwrap().iter().cloned().collect())
    }

    async fn open_pool(&self, partition: &PartitionName) -> Result<MemoryPool, PartitionError> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.fail_opens) {
            return Err(PartitionError::Connect {
                partition: partition.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.pools_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryPool {
            id: self.next_pool.fetch_add(1, Ordering::SeqCst),
            partition: partition.to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn close_pool(&self, pool: MemoryPool) {
        pool.closed.store(true, Ordering::SeqCst);
        self.pools_closed.fetch_add(1, Ordering::SeqCst);
    }

    async fn active_namespace(&self, pool: &MemoryPool) -> Result<String, PartitionError> {
        Ok(pool.partition.clone())
    }
}
