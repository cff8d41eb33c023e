use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::TokenVerifier;
use crate::catalog::PlanCatalog;
use crate::config::AppConfig;
use crate::database::models::plan::PlanType;
use crate::database::partition::{PartitionBackend, PartitionRouter};
use crate::database::store::TenantStore;
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, module_access_middleware, tenant_handle_middleware};
use crate::services::{ModuleGate, TenantService};

/// Request-level knobs taken from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ApiSettings {
    pub default_plan: PlanType,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl ApiSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_plan: config.tenancy.default_plan,
            default_page_size: config.api.default_page_size,
            max_page_size: config.api.max_page_size,
        }
    }
}

pub struct AppState<B: PartitionBackend> {
    pub tenants: Arc<TenantService>,
    pub gate: Arc<ModuleGate>,
    pub router: Arc<PartitionRouter<B>>,
    pub tokens: Arc<TokenVerifier>,
    pub settings: ApiSettings,
}

impl<B: PartitionBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            tenants: self.tenants.clone(),
            gate: self.gate.clone(),
            router: self.router.clone(),
            tokens: self.tokens.clone(),
            settings: self.settings,
        }
    }
}

impl<B: PartitionBackend> AppState<B> {
    pub fn new(
        store: Arc<dyn TenantStore>,
        router: Arc<PartitionRouter<B>>,
        catalog: Arc<PlanCatalog>,
        tokens: TokenVerifier,
        settings: ApiSettings,
    ) -> Self {
        let tenants = Arc::new(TenantService::new(store, router.clone(), catalog));
        let gate = Arc::new(ModuleGate::new(tenants.clone()));
        Self {
            tenants,
            gate,
            router,
            tokens: Arc::new(tokens),
            settings,
        }
    }
}

impl<B: PartitionBackend> FromRef<AppState<B>> for Arc<TenantService> {
    fn from_ref(state: &AppState<B>) -> Self {
        state.tenants.clone()
    }
}

impl<B: PartitionBackend> FromRef<AppState<B>> for Arc<PartitionRouter<B>> {
    fn from_ref(state: &AppState<B>) -> Self {
        state.router.clone()
    }
}

impl<B: PartitionBackend> FromRef<AppState<B>> for ApiSettings {
    fn from_ref(state: &AppState<B>) -> Self {
        state.settings
    }
}

pub fn app<B: PartitionBackend>(state: AppState<B>, config: &AppConfig) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health::<B>))
        // Management plane, never gated by module
        .merge(tenant_routes::<B>())
        // Tenant-scoped, gated by module and bound to the tenant partition
        .merge(tenant_scoped_routes(&state))
        .with_state(state.clone())
        // Layers run bottom-up: authenticate first, then gate
        .layer(from_fn_with_state(state.gate.clone(), module_access_middleware))
        .layer(from_fn_with_state(state.tokens.clone(), jwt_auth_middleware));

    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security.cors_origins));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn tenant_routes<B: PartitionBackend>() -> Router<AppState<B>> {
    use handlers::tenants;

    Router::new()
        .route("/api/v1/tenants", post(tenants::tenant_create).get(tenants::tenant_list))
        .route("/api/v1/tenants/me", get(tenants::tenant_me))
        .route("/api/v1/tenants/plans", get(tenants::plan_list))
        .route("/api/v1/tenants/:id", get(tenants::tenant_show).delete(tenants::tenant_delete))
        .route("/api/v1/tenants/:id/subscription", post(tenants::tenant_subscription))
        .route("/api/v1/tenants/:id/status", post(tenants::tenant_status))
        .route("/api/v1/tenants/:id/usage", get(tenants::tenant_usage))
        .route("/api/v1/tenants/:id/usage/logs", get(tenants::tenant_usage_logs))
        .route("/api/v1/tenants/:id/modules", get(tenants::tenant_modules))
        .route("/api/v1/tenants/:id/modules/:module/access", get(tenants::tenant_module_access))
        .route("/api/v1/tenants/:id/history", get(tenants::tenant_history))
        .route("/api/v1/tenants/:id/restore", post(tenants::tenant_restore))
}

fn tenant_scoped_routes<B: PartitionBackend>(state: &AppState<B>) -> Router<AppState<B>> {
    Router::new()
        .route("/api/v1/core/partition", get(handlers::core::partition_info::<B>))
        .route_layer(from_fn_with_state(state.router.clone(), tenant_handle_middleware::<B>))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
