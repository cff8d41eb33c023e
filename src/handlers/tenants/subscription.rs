// handlers/tenants/subscription.rs - POST /api/v1/tenants/:id/subscription

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::database::models::plan::PlanType;
use crate::middleware::auth::TENANTS_MANAGE;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::{SubscriptionUpdate, TenantService};

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub plan: PlanType,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/v1/tenants/:id/subscription - move the tenant to another plan
///
/// Expected Input:
/// ```json
/// { "plan": "enterprise", "reason": "Upgrade after sales call" }
/// ```
///
/// Responds with the updated tenant and the history row written for it.
pub async fn tenant_subscription(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    Path(tenant_id): Path<i64>,
    Json(request): Json<SubscriptionRequest>,
) -> ApiResult<SubscriptionUpdate> {
    context.require_permission(TENANTS_MANAGE)?;

    let update = service
        .update_subscription(tenant_id, request.plan, request.reason, Some(context.user_id.to_string()))
        .await?;
    Ok(ApiResponse::success(update))
}
