// handlers/tenants/create.rs - POST /api/v1/tenants

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::app::ApiSettings;
use crate::database::models::plan::PlanType;
use crate::database::models::principal::AdminPrincipal;
use crate::database::models::tenant::TenantProfile;
use crate::database::store::ProvisionedTenant;
use crate::middleware::auth::TENANTS_CREATE;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub tenant: TenantProfile,
    pub admin: AdminPrincipal,
    /// Falls back to the configured default plan.
    #[serde(default)]
    pub plan: Option<PlanType>,
}

/// POST /api/v1/tenants - provision a tenant, its partition and its admin
///
/// Expected Input:
/// ```json
/// {
///   "tenant": { "name": "Acme Corp", "slug": "acme", "contact_email": "ops@acme.test" },
///   "admin": { "username": "ada", "email": "ada@acme.test", "credential_hash": "$argon2id$..." },
///   "plan": "basic"
/// }
/// ```
///
/// Responds 201 with the tenant, the admin principal and the seeded roles.
pub async fn tenant_create(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    State(settings): State<ApiSettings>,
    Json(request): Json<CreateTenantRequest>,
) -> ApiResult<ProvisionedTenant> {
    context.require_permission(TENANTS_CREATE)?;

    let plan = request.plan.unwrap_or(settings.default_plan);
    let created = service.create_tenant(request.tenant, request.admin, plan).await?;

    Ok(ApiResponse::created(created))
}
