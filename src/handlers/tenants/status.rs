// handlers/tenants/status.rs - POST /api/v1/tenants/:id/status

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::database::models::tenant::{Tenant, TenantStatus};
use crate::error::ApiError;
use crate::middleware::auth::TENANTS_MANAGE;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TenantStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/v1/tenants/:id/status - suspend, activate or cancel
///
/// Expected Input:
/// ```json
/// { "status": "suspended", "reason": "Invoice overdue" }
/// ```
///
/// Other target states are reached only through the lifecycle itself.
pub async fn tenant_status(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Tenant> {
    context.require_permission(TENANTS_MANAGE)?;

    let tenant = match request.status {
        TenantStatus::Suspended => service.suspend(tenant_id, request.reason).await?,
        TenantStatus::Active => service.activate(tenant_id).await?,
        TenantStatus::Cancelled => service.cancel(tenant_id, request.reason).await?,
        other => {
            return Err(ApiError::field_error(
                "status",
                format!("Status '{}' cannot be set directly", other),
            ))
        }
    };
    Ok(ApiResponse::success(tenant))
}
