use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::error::TenantError;
use super::usage::{QuotaResource, ResourceUsage, UsageReport};
use crate::catalog::PlanCatalog;
use crate::database::models::ledger::{PlanChange, SubscriptionHistory, UsageEvent, UsageLog};
use crate::database::models::plan::{ModuleDefinition, PlanType, SubscriptionPlan};
use crate::database::models::principal::{default_role_templates, AdminPrincipal};
use crate::database::models::tenant::{NewTenant, Tenant, TenantProfile, TenantStatus};
use crate::database::partition::{PartitionName, PartitionProvisioner};
use crate::database::store::{
    MutationEffects, MutationOutcome, Page, PageRequest, ProvisionedTenant, StoreError, TenantFilter, TenantStore,
    TenantProvision,
};

/// Upper bound for a single usage-log read.
pub const MAX_USAGE_LOG_LIMIT: i64 = 1000;

/// Authorization granted to one request: the tenant, its partition key and
/// the module being used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: i64,
    pub slug: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    pub tenant: Tenant,
    pub history: SubscriptionHistory,
}

/// Orchestrates the tenant lifecycle over the metadata store and the
/// partition router.
///
/// Creation is two-phase: the idempotent partition DDL runs first, then
/// every row is written in one transaction. A failed transaction leaves an
/// empty partition behind; retrying with the same slug reuses it and
/// [`TenantService::find_orphan_partitions`] reports any that remain.
pub struct TenantService {
    store: Arc<dyn TenantStore>,
    partitions: Arc<dyn PartitionProvisioner>,
    catalog: Arc<PlanCatalog>,
}

impl TenantService {
    pub fn new(store: Arc<dyn TenantStore>, partitions: Arc<dyn PartitionProvisioner>, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            store,
            partitions,
            catalog,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    fn resolve_plan(&self, plan_type: PlanType) -> Result<&SubscriptionPlan, TenantError> {
        self.catalog
            .plan(plan_type)
            .ok_or_else(|| TenantError::InvalidPlan(plan_type.to_string()))
    }

    pub async fn create_tenant(
        &self,
        profile: TenantProfile,
        admin: AdminPrincipal,
        plan_type: PlanType,
    ) -> Result<ProvisionedTenant, TenantError> {
        let profile = profile.normalized().map_err(TenantError::Validation)?;
        let admin = admin.normalized().map_err(TenantError::Validation)?;
        let plan = self.resolve_plan(plan_type)?;

        // Conflicts are reported before any DDL runs.
        if self.store.slug_taken(&profile.slug).await? {
            return Err(TenantError::DuplicateSlug(profile.slug));
        }
        if self.store.admin_email_taken(&admin.email).await? {
            return Err(TenantError::DuplicateAdminEmail(admin.email));
        }

        let partition = self.partitions.create_partition(&profile.slug).await.map_err(|e| {
            warn!(slug = %profile.slug, "Partition provisioning failed: {}", e);
            TenantError::from(e)
        })?;

        let slug = profile.slug.clone();
        let email = admin.email.clone();
        let now = Utc::now();

        let mut tenant = NewTenant::from_plan(profile, plan);
        tenant.usage.current_users = 1;
        tenant.enter_initial_state(plan.trial_days, now);
        tenant.notes = Some(audit_line(now, &format!("created on plan {} as {}", plan.plan_type, tenant.status)));

        let created_event = UsageEvent::lifecycle("created").with_metadata(json!({
            "plan": plan.plan_type,
            "status": tenant.status,
            "partition": partition.as_str(),
        }));

        let provision = TenantProvision {
            tenant,
            admin,
            roles: default_role_templates(),
            created_event,
        };

        match self.store.insert_tenant(provision).await {
            Ok(created) => {
                info!(
                    tenant_id = created.tenant.id,
                    slug = %created.tenant.slug,
                    plan = %created.tenant.plan,
                    status = %created.tenant.status,
                    "Tenant created"
                );
                Ok(created)
            }
            Err(StoreError::Duplicate(kind)) => Err(TenantError::from_duplicate(kind, &slug, &email)),
            Err(e) => {
                warn!(slug = %slug, partition = %partition, "Tenant rows not committed, partition left for reconciliation: {}", e);
                Err(e.into())
            }
        }
    }

    /// Replace the tenant's grant with a fresh copy of `plan_type` and append
    /// exactly one history row.
    pub async fn update_subscription(
        &self,
        tenant_id: i64,
        plan_type: PlanType,
        reason: Option<String>,
        initiated_by: Option<String>,
    ) -> Result<SubscriptionUpdate, TenantError> {
        let existing = self.get_tenant(tenant_id).await?;
        if existing.is_deleted() {
            return Err(TenantError::not_found(tenant_id));
        }
        let plan = self.resolve_plan(plan_type)?.clone();
        let now = Utc::now();

        let outcome = self
            .store
            .update_tenant(
                tenant_id,
                Box::new(move |t: &mut Tenant| {
                    if t.is_deleted() {
                        return Err(TenantError::not_found(t.id));
                    }
                    if t.status.is_terminal() {
                        return Err(TenantError::Validation(format!(
                            "Tenant {} is {} and its subscription can no longer change",
                            t.id, t.status
                        )));
                    }

                    let old_plan = t.plan;
                    t.apply_plan(&plan);
                    if plan.has_trial() && t.status != TenantStatus::Trial && t.status.can_transition_to(TenantStatus::Trial) {
                        t.status = TenantStatus::Trial;
                        t.trial_ends_at = Some(now + Duration::days(i64::from(plan.trial_days)));
                    }
                    append_note(t, now, &format!("plan {} -> {}", old_plan, plan.plan_type));

                    Ok(MutationEffects {
                        history: Some(PlanChange {
                            old_plan,
                            new_plan: plan.plan_type,
                            reason: reason.clone(),
                            initiated_by: initiated_by.clone(),
                        }),
                        usage: Some(UsageEvent::lifecycle("subscription_changed").with_metadata(json!({
                            "old_plan": old_plan,
                            "new_plan": plan.plan_type,
                            "reason": reason,
                        }))),
                    })
                }),
            )
            .await?;

        let history = outcome
            .history
            .ok_or_else(|| StoreError::Corrupt(format!("no history row written for tenant {}", tenant_id)))?;
        info!(
            tenant_id,
            old_plan = %history.old_plan,
            new_plan = %history.new_plan,
            status = %outcome.tenant.status,
            "Subscription updated"
        );
        Ok(SubscriptionUpdate {
            tenant: outcome.tenant,
            history,
        })
    }

    async fn transition(
        &self,
        tenant_id: i64,
        to: TenantStatus,
        reason: Option<String>,
        action: &'static str,
    ) -> Result<Tenant, TenantError> {
        let now = Utc::now();
        let outcome = self
            .store
            .update_tenant(
                tenant_id,
                Box::new(move |t: &mut Tenant| {
                    if t.is_deleted() {
                        return Err(TenantError::not_found(t.id));
                    }
                    if t.status == to {
                        return Ok(MutationEffects::default());
                    }
                    if !t.status.can_transition_to(to) {
                        return Err(TenantError::InvalidTransition { from: t.status, to });
                    }

                    let from = t.status;
                    t.status = to;
                    if to == TenantStatus::Cancelled {
                        t.subscription_ends_at = Some(now);
                    }
                    let note = match &reason {
                        Some(reason) => format!("{} -> {}: {}", from, to, reason),
                        None => format!("{} -> {}", from, to),
                    };
                    append_note(t, now, &note);

                    Ok(MutationEffects {
                        history: None,
                        usage: Some(UsageEvent::lifecycle(action).with_metadata(json!({
                            "from": from,
                            "to": to,
                            "reason": reason,
                        }))),
                    })
                }),
            )
            .await?;

        if outcome.usage.is_some() {
            info!(tenant_id, status = %outcome.tenant.status, action, "Tenant status changed");
        }
        Ok(outcome.tenant)
    }

    /// Block every business operation. Partition and data are kept.
    pub async fn suspend(&self, tenant_id: i64, reason: Option<String>) -> Result<Tenant, TenantError> {
        self.transition(tenant_id, TenantStatus::Suspended, reason, "suspended").await
    }

    pub async fn activate(&self, tenant_id: i64) -> Result<Tenant, TenantError> {
        self.transition(tenant_id, TenantStatus::Active, None, "activated").await
    }

    /// Terminal. A cancelled tenant can never operate again.
    pub async fn cancel(&self, tenant_id: i64, reason: Option<String>) -> Result<Tenant, TenantError> {
        self.transition(tenant_id, TenantStatus::Cancelled, reason, "cancelled").await
    }

    /// Move every trial that ended before `now` to `EXPIRED`.
    pub async fn expire_trials(&self, now: DateTime<Utc>) -> Result<Vec<Tenant>, TenantError> {
        let candidates = self.store.trial_tenants_ending_before(now).await?;
        let mut expired = Vec::new();

        for tenant_id in candidates {
            let result = self
                .store
                .update_tenant(
                    tenant_id,
                    Box::new(move |t: &mut Tenant| {
                        // Re-checked under the row lock; the tenant may have
                        // converted since it was listed.
                        let due = t.status == TenantStatus::Trial
                            && !t.is_deleted()
                            && t.trial_ends_at.is_some_and(|end| end < now);
                        if !due {
                            return Ok(MutationEffects::default());
                        }
                        t.status = TenantStatus::Expired;
                        append_note(t, now, "trial -> expired");
                        Ok(MutationEffects {
                            history: None,
                            usage: Some(UsageEvent::lifecycle("trial_expired")),
                        })
                    }),
                )
                .await;

            match result {
                Ok(MutationOutcome { tenant, usage: Some(_), .. }) => {
                    info!(tenant_id, slug = %tenant.slug, "Trial expired");
                    expired.push(tenant);
                }
                Ok(_) => {}
                Err(TenantError::TenantNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    pub async fn get_usage(&self, tenant_id: i64) -> Result<UsageReport, TenantError> {
        let tenant = self.get_tenant(tenant_id).await?;
        let partition = PartitionName::for_slug(&tenant.slug)?;

        let users = self.store.count_active_users(tenant_id).await?;
        let employees = self.store.count_active_employees(&partition).await?;

        Ok(UsageReport {
            tenant_id,
            plan: tenant.plan,
            status: tenant.status,
            users: ResourceUsage::new(users, tenant.quotas.max_users),
            employees: ResourceUsage::new(employees, tenant.quotas.max_employees),
            storage: ResourceUsage::new(tenant.usage.current_storage_gb, tenant.quotas.max_storage_gb),
            trial_ends_at: tenant.trial_ends_at,
            generated_at: Utc::now(),
        })
    }

    /// Fails with `QuotaExceeded` when adding `additional` units of
    /// `resource` would go over the tenant's quota.
    pub async fn check_quota(
        &self,
        tenant_id: i64,
        resource: QuotaResource,
        additional: Decimal,
    ) -> Result<(), TenantError> {
        let report = self.get_usage(tenant_id).await?;
        let usage = report.resource(resource);
        if usage.would_exceed(additional) {
            return Err(TenantError::QuotaExceeded {
                resource,
                current: usage.current,
                requested: additional,
                limit: usage.limit,
            });
        }
        Ok(())
    }

    /// True iff the tenant may operate and `module` is in its grant.
    /// Unknown and soft-deleted tenants have no access.
    pub async fn check_module_access(&self, tenant_id: i64, module: &str) -> Result<bool, TenantError> {
        Ok(self.module_grant(tenant_id, module).await?.is_some())
    }

    pub async fn module_grant(&self, tenant_id: i64, module: &str) -> Result<Option<TenantScope>, TenantError> {
        let tenant = self.store.find_tenant(tenant_id).await?;
        Ok(tenant.filter(|t| t.has_module_access(module)).map(|t| TenantScope {
            tenant_id: t.id,
            slug: t.slug,
            module: module.to_string(),
        }))
    }

    pub async fn list_tenants(&self, filter: &TenantFilter, page: PageRequest) -> Result<Page<Tenant>, TenantError> {
        let (tenants, total) = self.store.list_tenants(filter, &page).await?;
        Ok(Page::new(tenants, total, page))
    }

    /// Includes soft-deleted tenants.
    pub async fn get_tenant(&self, tenant_id: i64) -> Result<Tenant, TenantError> {
        self.store
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| TenantError::not_found(tenant_id))
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> Result<Tenant, TenantError> {
        let slug = slug.trim().to_ascii_lowercase();
        self.store
            .find_tenant_by_slug(&slug)
            .await?
            .ok_or(TenantError::TenantNotFound(slug))
    }

    /// Module definitions for the tenant's current grant, in catalog order.
    pub async fn list_available_modules(&self, tenant_id: i64) -> Result<Vec<ModuleDefinition>, TenantError> {
        let tenant = self.get_tenant(tenant_id).await?;
        if tenant.is_deleted() {
            return Err(TenantError::not_found(tenant_id));
        }
        Ok(self
            .catalog
            .modules_for(&tenant.enabled_modules)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn list_plans(&self) -> Vec<SubscriptionPlan> {
        self.catalog.active_plans().into_iter().cloned().collect()
    }

    /// Append a metered event. Storage events also move the tenant's
    /// storage counter, clamped at zero, in the same unit of work.
    pub async fn record_usage(&self, tenant_id: i64, event: UsageEvent) -> Result<UsageLog, TenantError> {
        if event.resource_type.trim().is_empty() || event.action.trim().is_empty() {
            return Err(TenantError::Validation("Usage events need a resource type and an action".to_string()));
        }

        if !event.is_storage() {
            let tenant = self.get_tenant(tenant_id).await?;
            if tenant.is_deleted() {
                return Err(TenantError::not_found(tenant_id));
            }
            return Ok(self.store.append_usage(tenant_id, event).await?);
        }

        let outcome = self
            .store
            .update_tenant(
                tenant_id,
                Box::new(move |t: &mut Tenant| {
                    if t.is_deleted() {
                        return Err(TenantError::not_found(t.id));
                    }
                    let next = t
                        .usage
                        .current_storage_gb
                        .checked_add(event.quantity)
                        .ok_or_else(|| {
                            TenantError::Validation(format!("Storage quantity {} is out of range", event.quantity))
                        })?;
                    t.usage.current_storage_gb = next.max(Decimal::ZERO);
                    Ok(MutationEffects {
                        history: None,
                        usage: Some(event),
                    })
                }),
            )
            .await?;

        outcome
            .usage
            .ok_or_else(|| StoreError::Corrupt(format!("no usage row written for tenant {}", tenant_id)).into())
    }

    /// Soft delete. The tenant stops resolving everywhere and its pooled
    /// connections are released; the partition is kept.
    pub async fn deactivate(&self, tenant_id: i64) -> Result<Tenant, TenantError> {
        let now = Utc::now();
        let outcome = self
            .store
            .update_tenant(
                tenant_id,
                Box::new(move |t: &mut Tenant| {
                    if t.is_deleted() {
                        return Err(TenantError::not_found(t.id));
                    }
                    t.deleted_at = Some(now);
                    append_note(t, now, "deactivated");
                    Ok(MutationEffects {
                        history: None,
                        usage: Some(UsageEvent::lifecycle("deactivated")),
                    })
                }),
            )
            .await?;

        self.partitions.close(&outcome.tenant.slug).await;
        info!(tenant_id, slug = %outcome.tenant.slug, "Tenant deactivated");
        Ok(outcome.tenant)
    }

    pub async fn restore(&self, tenant_id: i64) -> Result<Tenant, TenantError> {
        let now = Utc::now();
        let outcome = self
            .store
            .update_tenant(
                tenant_id,
                Box::new(move |t: &mut Tenant| {
                    if !t.is_deleted() {
                        return Ok(MutationEffects::default());
                    }
                    t.deleted_at = None;
                    append_note(t, now, "restored");
                    Ok(MutationEffects {
                        history: None,
                        usage: Some(UsageEvent::lifecycle("restored")),
                    })
                }),
            )
            .await?;

        info!(tenant_id, slug = %outcome.tenant.slug, "Tenant restored");
        Ok(outcome.tenant)
    }

    pub async fn subscription_history(&self, tenant_id: i64) -> Result<Vec<SubscriptionHistory>, TenantError> {
        self.get_tenant(tenant_id).await?;
        Ok(self.store.subscription_history(tenant_id).await?)
    }

    pub async fn usage_logs(&self, tenant_id: i64, limit: i64) -> Result<Vec<UsageLog>, TenantError> {
        self.get_tenant(tenant_id).await?;
        let limit = limit.clamp(1, MAX_USAGE_LOG_LIMIT);
        Ok(self.store.usage_logs(tenant_id, limit).await?)
    }

    /// Partitions with no tenant row, typically left by a creation whose
    /// transaction failed. Reported only; nothing is dropped.
    pub async fn find_orphan_partitions(&self) -> Result<Vec<PartitionName>, TenantError> {
        let partitions = self.partitions.list_partitions().await?;
        let slugs = self.store.tenant_slugs().await?;
        Ok(partitions
            .into_iter()
            .filter(|p| !slugs.contains(p.slug()))
            .collect())
    }

    pub async fn ping(&self) -> Result<(), TenantError> {
        Ok(self.store.ping().await?)
    }
}

fn audit_line(at: DateTime<Utc>, text: &str) -> String {
    format!("[{}] {}", at.format("%Y-%m-%d %H:%M:%S UTC"), text)
}

fn append_note(tenant: &mut Tenant, at: DateTime<Utc>, text: &str) {
    let line = audit_line(at, text);
    tenant.notes = Some(match tenant.notes.take() {
        Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, line),
        _ => line,
    });
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::database::partition::PartitionRouter;
    use crate::testing::{admin_principal, profile, MemoryPartitionBackend, MemoryTenantStore};

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    struct Harness {
        service: TenantService,
        store: Arc<MemoryTenantStore>,
        router: Arc<PartitionRouter<MemoryPartitionBackend>>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryTenantStore::new());
        let router = Arc::new(PartitionRouter::new(MemoryPartitionBackend::new()));
        let service = TenantService::new(store.clone(), router.clone(), Arc::new(PlanCatalog::defaults()));
        Harness { service, store, router }
    }

    async fn create(h: &Harness, slug: &str, plan: PlanType) -> Tenant {
        h.service
            .create_tenant(profile(slug), admin_principal(slug), plan)
            .await
            .unwrap()
            .tenant
    }

    #[tokio::test]
    async fn trial_plan_starts_in_trial() {
        let h = harness();
        let before = Utc::now();
        let tenant = create(&h, "acme", PlanType::Basic).await;

        assert_eq!(tenant.status, TenantStatus::Trial);
        let ends = tenant.trial_ends_at.unwrap();
        let expected = before + Duration::days(14);
        assert!((ends - expected).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn plan_without_trial_starts_active() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;

        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.trial_ends_at, None);
    }

    #[tokio::test]
    async fn creation_provisions_partition_admin_and_roles() {
        let h = harness();
        let created = h
            .service
            .create_tenant(profile("acme"), admin_principal("acme"), PlanType::Professional)
            .await
            .unwrap();

        assert!(h.router.partition_exists("acme").await.unwrap());
        assert!(created.admin.is_tenant_admin);
        assert_eq!(created.admin.tenant_id, created.tenant.id);
        let names: Vec<_> = created.roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Admin", "Manager", "Employee", "HR Staff"]);
        assert_eq!(created.tenant.usage.current_users, 1);

        let plan = PlanCatalog::defaults().plan(PlanType::Professional).unwrap().clone();
        assert_eq!(created.tenant.enabled_modules, plan.enabled_modules);
        assert_eq!(created.tenant.quotas, plan.quotas);

        let logs = h.service.usage_logs(created.tenant.id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "created");
    }

    #[tokio::test]
    async fn unknown_or_inactive_plan_is_rejected_before_ddl() {
        let h = harness();
        let err = h
            .service
            .create_tenant(profile("acme"), admin_principal("acme"), PlanType::Custom)
            .await
            .unwrap_err();

        assert!(matches!(err, TenantError::InvalidPlan(_)));
        assert_eq!(h.router.backend().create_calls(), 0);
    }

    #[tokio::test]
    async fn duplicates_are_detected_before_ddl() {
        let h = harness();
        create(&h, "acme", PlanType::Free).await;
        let calls = h.router.backend().create_calls();

        let err = h
            .service
            .create_tenant(profile("ACME"), admin_principal("other"), PlanType::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::DuplicateSlug(ref s) if s == "acme"));

        let err = h
            .service
            .create_tenant(profile("globex"), admin_principal("acme"), PlanType::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::DuplicateAdminEmail(_)));
        assert_eq!(h.router.backend().create_calls(), calls);
    }

    #[tokio::test]
    async fn partition_failure_prevents_tenant_row() {
        let h = harness();
        h.router.backend().fail_next_creates(1);

        let err = h
            .service
            .create_tenant(profile("acme"), admin_principal("acme"), PlanType::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::PartitionProvisioningFailed(_)));
        assert!(h.service.get_tenant_by_slug("acme").await.is_err());
        assert_eq!(h.store.tenant_count().await, 0);
    }

    #[tokio::test]
    async fn retry_after_failed_commit_reuses_orphan_partition() {
        let h = harness();
        h.store.fail_next_insert();

        let err = h
            .service
            .create_tenant(profile("acme"), admin_principal("acme"), PlanType::Free)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let orphans = h.service.find_orphan_partitions().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].slug(), "acme");

        create(&h, "acme", PlanType::Free).await;
        assert!(h.service.find_orphan_partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn basic_plan_does_not_grant_payroll() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Basic).await;

        assert!(!h.service.check_module_access(tenant.id, "payroll").await.unwrap());
        assert!(h.service.check_module_access(tenant.id, "employees").await.unwrap());
    }

    #[tokio::test]
    async fn suspension_revokes_access_until_activation() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        assert!(h.service.check_module_access(tenant.id, "employees").await.unwrap());

        let suspended = h.service.suspend(tenant.id, Some("unpaid".into())).await.unwrap();
        assert_eq!(suspended.status, TenantStatus::Suspended);
        for module in &tenant.enabled_modules {
            assert!(!h.service.check_module_access(tenant.id, module).await.unwrap());
        }

        h.service.activate(tenant.id).await.unwrap();
        assert!(h.service.check_module_access(tenant.id, "employees").await.unwrap());
        assert!(h.service.get_tenant(tenant.id).await.unwrap().notes.unwrap().contains("unpaid"));
    }

    #[tokio::test]
    async fn upgrade_copies_quotas_and_records_one_history_row() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        assert_eq!(tenant.quotas.max_employees, 10);

        let update = h
            .service
            .update_subscription(tenant.id, PlanType::Enterprise, Some("growth".into()), Some("ops".into()))
            .await
            .unwrap();

        assert_eq!(update.tenant.quotas.max_employees, 1000);
        assert_eq!(update.history.old_plan, PlanType::Free);
        assert_eq!(update.history.new_plan, PlanType::Enterprise);

        let history = h.service.subscription_history(tenant.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].initiated_by.as_deref(), Some("ops"));

        // Enterprise has a trial and the tenant was active, so the window restarts.
        assert_eq!(update.tenant.status, TenantStatus::Trial);
    }

    #[tokio::test]
    async fn every_subscription_update_appends_history() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        for plan in [PlanType::Basic, PlanType::Basic, PlanType::Free] {
            h.service.update_subscription(tenant.id, plan, None, None).await.unwrap();
        }

        let history = h.service.subscription_history(tenant.id).await.unwrap();
        let pairs: Vec<_> = history.iter().map(|h| (h.old_plan, h.new_plan)).collect();
        assert_eq!(
            pairs,
            vec![
                (PlanType::Free, PlanType::Basic),
                (PlanType::Basic, PlanType::Basic),
                (PlanType::Basic, PlanType::Free),
            ]
        );
    }

    #[tokio::test]
    async fn grants_stay_within_plan_and_dependency_closed() {
        let h = harness();
        let catalog = PlanCatalog::defaults();
        let tenant = create(&h, "acme", PlanType::Basic).await;

        for plan_type in [PlanType::Professional, PlanType::Free, PlanType::Enterprise] {
            let t = h.service.update_subscription(tenant.id, plan_type, None, None).await.unwrap().tenant;
            let plan = catalog.plan(plan_type).unwrap();
            assert!(t.enabled_modules.is_subset(&plan.enabled_modules));
            assert!(catalog.unsatisfied_dependencies(&t.enabled_modules).is_empty());
        }
    }

    #[tokio::test]
    async fn update_subscription_checks_tenant_then_plan() {
        let h = harness();
        assert!(matches!(
            h.service.update_subscription(999, PlanType::Basic, None, None).await,
            Err(TenantError::TenantNotFound(_))
        ));

        let tenant = create(&h, "acme", PlanType::Free).await;
        assert!(matches!(
            h.service.update_subscription(tenant.id, PlanType::Custom, None, None).await,
            Err(TenantError::InvalidPlan(_))
        ));
        assert!(h.service.subscription_history(tenant.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suspended_tenant_keeps_status_on_plan_change() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        h.service.suspend(tenant.id, None).await.unwrap();

        let t = h
            .service
            .update_subscription(tenant.id, PlanType::Basic, None, None)
            .await
            .unwrap()
            .tenant;
        assert_eq!(t.status, TenantStatus::Suspended);
        assert!(!h.service.check_module_access(tenant.id, "leave").await.unwrap());
    }

    #[tokio::test]
    async fn cancellation_is_terminal() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        h.service.cancel(tenant.id, Some("closing".into())).await.unwrap();

        assert!(matches!(
            h.service.activate(tenant.id).await,
            Err(TenantError::InvalidTransition { from: TenantStatus::Cancelled, to: TenantStatus::Active })
        ));
        assert!(matches!(
            h.service.update_subscription(tenant.id, PlanType::Basic, None, None).await,
            Err(TenantError::Validation(_))
        ));
        assert!(!h.service.check_module_access(tenant.id, "core").await.unwrap());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_and_same_state_is_noop() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;

        let again = h.service.activate(tenant.id).await.unwrap();
        assert_eq!(again.status, TenantStatus::Active);

        h.service.suspend(tenant.id, None).await.unwrap();
        assert!(matches!(
            h.service.cancel(tenant.id, None).await,
            Err(TenantError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn expire_trials_only_touches_elapsed_trials() {
        let h = harness();
        let trial = create(&h, "acme", PlanType::Basic).await;
        let active = create(&h, "globex", PlanType::Free).await;

        assert!(h.service.expire_trials(Utc::now()).await.unwrap().is_empty());

        let later = Utc::now() + Duration::days(15);
        let expired = h.service.expire_trials(later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, trial.id);
        assert_eq!(h.service.get_tenant(active.id).await.unwrap().status, TenantStatus::Active);
        assert!(!h.service.check_module_access(trial.id, "employees").await.unwrap());

        // An expired tenant can be brought back.
        h.service.activate(trial.id).await.unwrap();
        assert!(h.service.check_module_access(trial.id, "employees").await.unwrap());
    }

    #[tokio::test]
    async fn usage_report_and_quota_checks() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        h.store.set_employee_count("acme", 10).await;

        let report = h.service.get_usage(tenant.id).await.unwrap();
        assert_eq!(report.users.current, dec(1));
        assert_eq!(report.employees.percentage, 100.0);

        assert!(matches!(
            h.service.check_quota(tenant.id, QuotaResource::Employees, dec(1)).await,
            Err(TenantError::QuotaExceeded { resource: QuotaResource::Employees, .. })
        ));
        h.service.check_quota(tenant.id, QuotaResource::Users, dec(2)).await.unwrap();
        assert!(h.service.check_quota(tenant.id, QuotaResource::Users, dec(3)).await.is_err());
    }

    #[tokio::test]
    async fn storage_events_move_the_counter() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;

        let event = UsageEvent::new("storage", "upload").with_quantity(Decimal::new(5, 1));
        h.service.record_usage(tenant.id, event).await.unwrap();
        let event = UsageEvent::new("storage", "delete").with_quantity(Decimal::new(-20, 1));
        h.service.record_usage(tenant.id, event).await.unwrap();
        h.service
            .record_usage(tenant.id, UsageEvent::new("api", "request"))
            .await
            .unwrap();

        let t = h.service.get_tenant(tenant.id).await.unwrap();
        assert_eq!(t.usage.current_storage_gb, Decimal::ZERO);
        assert_eq!(h.service.usage_logs(tenant.id, 100).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn storage_overflow_is_a_validation_error() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;

        let event = UsageEvent::new("storage", "upload").with_quantity(Decimal::MAX);
        h.service.record_usage(tenant.id, event.clone()).await.unwrap();
        assert!(matches!(
            h.service.record_usage(tenant.id, event).await,
            Err(TenantError::Validation(_))
        ));
        let t = h.service.get_tenant(tenant.id).await.unwrap();
        assert_eq!(t.usage.current_storage_gb, Decimal::MAX);

        assert!(matches!(
            h.service.check_quota(tenant.id, QuotaResource::Storage, Decimal::MAX).await,
            Err(TenantError::QuotaExceeded { resource: QuotaResource::Storage, .. })
        ));
    }

    #[tokio::test]
    async fn deactivate_hides_tenant_and_closes_pool() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Free).await;
        let handle = h.router.get_handle("acme").await.unwrap();

        h.service.deactivate(tenant.id).await.unwrap();
        assert!(handle.pool.is_closed());
        assert!(!h.service.check_module_access(tenant.id, "core").await.unwrap());
        assert!(matches!(
            h.service.suspend(tenant.id, None).await,
            Err(TenantError::TenantNotFound(_))
        ));
        assert!(h.service.get_tenant(tenant.id).await.unwrap().is_deleted());

        let page = h
            .service
            .list_tenants(&TenantFilter::default(), PageRequest::new(1, 20, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(page.total, 0);

        h.service.restore(tenant.id).await.unwrap();
        assert!(h.service.check_module_access(tenant.id, "core").await.unwrap());
    }

    #[tokio::test]
    async fn list_tenants_filters_and_pages_newest_first() {
        let h = harness();
        for slug in ["alpha", "bravo", "charlie"] {
            create(&h, slug, PlanType::Free).await;
        }
        create(&h, "delta", PlanType::Basic).await;

        let page = h
            .service
            .list_tenants(&TenantFilter::default(), PageRequest::new(1, 3, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 2);
        assert_eq!(page.items[0].slug, "delta");

        let filter = TenantFilter {
            status: Some(TenantStatus::Trial),
            ..Default::default()
        };
        let trials = h
            .service
            .list_tenants(&filter, PageRequest::new(1, 20, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(trials.items.len(), 1);

        let filter = TenantFilter {
            search: Some("BRAV".into()),
            ..Default::default()
        };
        let found = h
            .service
            .list_tenants(&filter, PageRequest::new(1, 20, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(found.items[0].slug, "bravo");
    }

    #[tokio::test]
    async fn search_matches_company_name() {
        let h = harness();
        let mut p = profile("acme");
        p.company_name = Some("Globex Holdings".into());
        h.service
            .create_tenant(p, admin_principal("acme"), PlanType::Free)
            .await
            .unwrap();
        create(&h, "initech", PlanType::Free).await;

        let filter = TenantFilter {
            search: Some("globex".into()),
            ..Default::default()
        };
        let found = h
            .service
            .list_tenants(&filter, PageRequest::new(1, 20, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].slug, "acme");
    }

    #[tokio::test]
    async fn available_modules_follow_catalog_order() {
        let h = harness();
        let tenant = create(&h, "acme", PlanType::Basic).await;
        let modules = h.service.list_available_modules(tenant.id).await.unwrap();

        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["core", "employees", "departments", "leave", "attendance"]);
        let granted: BTreeSet<String> = names.iter().map(|s| s.to_string()).collect();
        assert_eq!(granted, tenant.enabled_modules);
    }
}
