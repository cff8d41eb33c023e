use std::sync::Arc;

use tracing::{debug, warn};

use super::error::TenantError;
use super::tenant_service::{TenantScope, TenantService};
use crate::catalog::PlanCatalog;

pub const API_PREFIX: &str = "/api/v1";

/// Paths that stay reachable for tenants with no usable grant.
const BYPASS_PREFIXES: &[&str] = &["/api/v1/auth", "/api/v1/tenants", "/health", "/docs", "/openapi.json"];

/// How a request path relates to module gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass {
    /// Management, authentication and health endpoints.
    Bypass,
    /// Outside the versioned API entirely.
    Ungated,
    /// Served by this module.
    Module(String),
    /// Under the API prefix but owned by no known module.
    Unmapped,
}

/// Maps `/api/v1/<segment>` paths to module names. Matching respects
/// segment boundaries so `/api/v1/leaves` is not the `leave` module.
#[derive(Debug, Clone)]
pub struct ModuleRouteTable {
    routes: Vec<(String, String)>,
}

impl ModuleRouteTable {
    pub fn from_catalog(catalog: &PlanCatalog) -> Self {
        Self::from_modules(catalog.modules().into_iter().map(|m| m.name.clone()))
    }

    pub fn from_modules(modules: impl IntoIterator<Item = String>) -> Self {
        let routes = modules
            .into_iter()
            .map(|name| (format!("{}/{}", API_PREFIX, name), name))
            .collect();
        Self { routes }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        if BYPASS_PREFIXES.iter().any(|prefix| matches_prefix(path, prefix)) {
            return RouteClass::Bypass;
        }
        if !matches_prefix(path, API_PREFIX) {
            return RouteClass::Ungated;
        }
        self.routes
            .iter()
            .find(|(prefix, _)| matches_prefix(path, prefix))
            .map(|(_, module)| RouteClass::Module(module.clone()))
            .unwrap_or(RouteClass::Unmapped)
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Bypass,
    Unauthenticated,
    Granted(TenantScope),
    /// One outcome for an unknown tenant, a non-operating tenant, an
    /// unmapped path and a module outside the plan.
    Denied,
}

/// Per-request module authorization.
pub struct ModuleGate {
    service: Arc<TenantService>,
    routes: ModuleRouteTable,
}

impl ModuleGate {
    pub fn new(service: Arc<TenantService>) -> Self {
        let routes = ModuleRouteTable::from_catalog(service.catalog());
        Self { service, routes }
    }

    pub fn with_routes(service: Arc<TenantService>, routes: ModuleRouteTable) -> Self {
        Self { service, routes }
    }

    pub fn routes(&self) -> &ModuleRouteTable {
        &self.routes
    }

    /// Decide whether the caller's tenant may reach `path`. Only store
    /// faults surface as errors.
    pub async fn evaluate(&self, path: &str, tenant_id: Option<i64>) -> Result<GateOutcome, TenantError> {
        let module = match self.routes.classify(path) {
            RouteClass::Bypass | RouteClass::Ungated => return Ok(GateOutcome::Bypass),
            RouteClass::Module(module) => Some(module),
            RouteClass::Unmapped => None,
        };

        let Some(tenant_id) = tenant_id else {
            return Ok(GateOutcome::Unauthenticated);
        };

        let Some(module) = module else {
            warn!(tenant_id, path, "Denied request to unmapped API path");
            return Ok(GateOutcome::Denied);
        };

        match self.service.module_grant(tenant_id, &module).await? {
            Some(scope) => {
                debug!(tenant_id, module = %module, "Module access granted");
                Ok(GateOutcome::Granted(scope))
            }
            None => {
                warn!(tenant_id, module = %module, path, "Module access denied");
                Ok(GateOutcome::Denied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::plan::PlanType;
    use crate::database::partition::PartitionRouter;
    use crate::testing::{admin_principal, profile, MemoryPartitionBackend, MemoryTenantStore};

    fn table() -> ModuleRouteTable {
        ModuleRouteTable::from_catalog(&PlanCatalog::defaults())
    }

    #[test]
    fn classifies_paths() {
        let t = table();
        assert_eq!(t.classify("/api/v1/payroll/runs"), RouteClass::Module("payroll".into()));
        assert_eq!(t.classify("/api/v1/core"), RouteClass::Module("core".into()));
        assert_eq!(t.classify("/api/v1/tenants/me"), RouteClass::Bypass);
        assert_eq!(t.classify("/api/v1/auth/login"), RouteClass::Bypass);
        assert_eq!(t.classify("/health"), RouteClass::Bypass);
        assert_eq!(t.classify("/"), RouteClass::Ungated);
        assert_eq!(t.classify("/api/v1/unknown"), RouteClass::Unmapped);
    }

    #[test]
    fn prefix_matching_respects_segments() {
        let t = table();
        assert_eq!(t.classify("/api/v1/leaves"), RouteClass::Unmapped);
        assert_eq!(t.classify("/api/v1/tenantsx"), RouteClass::Unmapped);
        assert_eq!(t.classify("/api/v10/core"), RouteClass::Ungated);
    }

    async fn gate_with_tenant(plan: PlanType) -> (ModuleGate, Arc<TenantService>, i64) {
        let store = Arc::new(MemoryTenantStore::new());
        let router = Arc::new(PartitionRouter::new(MemoryPartitionBackend::new()));
        let service = Arc::new(TenantService::new(store, router, Arc::new(PlanCatalog::defaults())));
        let tenant = service
            .create_tenant(profile("acme"), admin_principal("acme"), plan)
            .await
            .unwrap()
            .tenant;
        (ModuleGate::new(service.clone()), service, tenant.id)
    }

    #[tokio::test]
    async fn grants_modules_in_plan() {
        let (gate, _, id) = gate_with_tenant(PlanType::Basic).await;
        let outcome = gate.evaluate("/api/v1/employees/7", Some(id)).await.unwrap();
        assert_eq!(
            outcome,
            GateOutcome::Granted(TenantScope {
                tenant_id: id,
                slug: "acme".into(),
                module: "employees".into(),
            })
        );
    }

    #[tokio::test]
    async fn denials_are_uniform() {
        let (gate, service, id) = gate_with_tenant(PlanType::Basic).await;

        assert_eq!(gate.evaluate("/api/v1/payroll", Some(id)).await.unwrap(), GateOutcome::Denied);
        assert_eq!(gate.evaluate("/api/v1/nonexistent", Some(id)).await.unwrap(), GateOutcome::Denied);
        assert_eq!(gate.evaluate("/api/v1/employees", Some(9999)).await.unwrap(), GateOutcome::Denied);

        service.suspend(id, None).await.unwrap();
        assert_eq!(gate.evaluate("/api/v1/employees", Some(id)).await.unwrap(), GateOutcome::Denied);
    }

    #[tokio::test]
    async fn management_paths_bypass_for_suspended_tenant() {
        let (gate, service, id) = gate_with_tenant(PlanType::Free).await;
        service.suspend(id, None).await.unwrap();

        assert_eq!(gate.evaluate("/api/v1/tenants/me", Some(id)).await.unwrap(), GateOutcome::Bypass);
        assert_eq!(gate.evaluate("/api/v1/auth/login", None).await.unwrap(), GateOutcome::Bypass);
    }

    #[tokio::test]
    async fn gated_path_without_identity_is_unauthenticated() {
        let (gate, _, _) = gate_with_tenant(PlanType::Free).await;
        assert_eq!(gate.evaluate("/api/v1/core", None).await.unwrap(), GateOutcome::Unauthenticated);
    }
}
