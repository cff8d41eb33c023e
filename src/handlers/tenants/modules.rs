// handlers/tenants/modules.rs - module grants of one tenant

use std::sync::Arc;

use axum::extract::{Path, State};
use serde::Serialize;

use crate::database::models::plan::ModuleDefinition;
use crate::middleware::auth::TENANTS_READ;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

#[derive(Debug, Serialize)]
pub struct ModuleAccess {
    pub tenant_id: i64,
    pub module: String,
    pub has_access: bool,
}

/// GET /api/v1/tenants/:id/modules - definitions of every granted module
pub async fn tenant_modules(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Vec<ModuleDefinition>> {
    context.require_permission(TENANTS_READ)?;
    context.require_tenant_access(tenant_id)?;

    Ok(ApiResponse::success(service.list_available_modules(tenant_id).await?))
}

/// GET /api/v1/tenants/:id/modules/:module/access
pub async fn tenant_module_access(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path((tenant_id, module)): Path<(i64, String)>,
) -> ApiResult<ModuleAccess> {
    context.require_permission(TENANTS_READ)?;
    context.require_tenant_access(tenant_id)?;

    let has_access = service.check_module_access(tenant_id, &module).await?;
    Ok(ApiResponse::success(ModuleAccess {
        tenant_id,
        module,
        has_access,
    }))
}
