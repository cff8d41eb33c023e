// handlers/tenants/usage.rs - GET /api/v1/tenants/:id/usage

use std::sync::Arc;

use axum::extract::{Path, State};

use crate::middleware::auth::TENANTS_READ;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::{TenantService, UsageReport};

/// Current consumption against the tenant's quotas.
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "tenant_id": 12,
///     "plan": "basic",
///     "status": "trial",
///     "users": { "current": "3", "limit": "10", "percentage": 30.0 },
///     "employees": { "current": "41", "limit": "50", "percentage": 82.0 },
///     "storage": { "current": "1.5", "limit": "5", "percentage": 30.0 }
///   }
/// }
/// ```
pub async fn tenant_usage(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<UsageReport> {
    context.require_permission(TENANTS_READ)?;
    context.require_tenant_access(tenant_id)?;

    Ok(ApiResponse::success(service.get_usage(tenant_id).await?))
}
