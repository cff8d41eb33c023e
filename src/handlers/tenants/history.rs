// handlers/tenants/history.rs - subscription and usage ledgers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::database::models::ledger::{SubscriptionHistory, UsageLog};
use crate::middleware::auth::TENANTS_READ;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/v1/tenants/:id/history - plan changes, oldest first
pub async fn tenant_history(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
) -> ApiResult<Vec<SubscriptionHistory>> {
    context.require_permission(TENANTS_READ)?;
    context.require_tenant_access(tenant_id)?;

    Ok(ApiResponse::success(service.subscription_history(tenant_id).await?))
}

/// GET /api/v1/tenants/:id/usage/logs?limit=100 - newest first
pub async fn tenant_usage_logs(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Vec<UsageLog>> {
    context.require_permission(TENANTS_READ)?;
    context.require_tenant_access(tenant_id)?;

    Ok(ApiResponse::success(service.usage_logs(tenant_id, query.limit).await?))
}
