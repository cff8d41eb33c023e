// handlers/tenants/show.rs - GET /api/v1/tenants/:id and GET /api/v1/tenants/me

use std::sync::Arc;

use axum::extract::{Path, State};

use crate::database::models::tenant::Tenant;
use crate::middleware::auth::TENANTS_READ;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

pub async fn tenant_show(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Tenant> {
    context.require_permission(TENANTS_READ)?;
    context.require_tenant_access(tenant_id)?;

    Ok(ApiResponse::success(service.get_tenant(tenant_id).await?))
}

/// The caller's own tenant, whatever its status.
pub async fn tenant_me(context: SecurityContext, State(service): State<Arc<TenantService>>) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(service.get_tenant(context.tenant_id).await?))
}
