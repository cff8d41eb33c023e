// handlers/tenants/plans.rs - GET /api/v1/tenants/plans

use std::sync::Arc;

use axum::extract::State;

use crate::database::models::plan::SubscriptionPlan;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TenantService;

/// Active plans in display order. Public, for pricing and signup pages.
pub async fn plan_list(State(service): State<Arc<TenantService>>) -> ApiResult<Vec<SubscriptionPlan>> {
    Ok(ApiResponse::success(service.list_plans()))
}
