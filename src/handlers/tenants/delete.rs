// handlers/tenants/delete.rs - DELETE /api/v1/tenants/:id

use std::sync::Arc;

use axum::extract::{Path, State};

use crate::database::models::tenant::Tenant;
use crate::middleware::auth::TENANTS_MANAGE;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

/// Soft delete. The partition and its data are kept; the tenant's pooled
/// connections are closed and every gated request is denied.
pub async fn tenant_delete(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Tenant> {
    context.require_permission(TENANTS_MANAGE)?;

    Ok(ApiResponse::success(service.deactivate(tenant_id).await?))
}
