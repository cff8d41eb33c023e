// handlers/tenants/restore.rs - POST /api/v1/tenants/:id/restore

use std::sync::Arc;

use axum::extract::{Path, State};

use crate::database::models::tenant::Tenant;
use crate::middleware::auth::TENANTS_MANAGE;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

pub async fn tenant_restore(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Tenant> {
    context.require_permission(TENANTS_MANAGE)?;

    Ok(ApiResponse::success(service.restore(tenant_id).await?))
}
