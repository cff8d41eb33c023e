// handlers/tenants/list.rs - GET /api/v1/tenants

use std::sync::Arc;

use axum::extract::{Query, State};
use serde::Deserialize;

use crate::app::ApiSettings;
use crate::database::models::plan::PlanType;
use crate::database::models::tenant::{Tenant, TenantStatus};
use crate::database::store::{PageRequest, TenantFilter};
use crate::error::ApiError;
use crate::middleware::auth::TENANTS_MANAGE;
use crate::middleware::{ApiResponse, ApiResult, SecurityContext};
use crate::services::TenantService;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<TenantStatus>,
    pub plan: Option<PlanType>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// GET /api/v1/tenants?page=1&size=20&status=trial&plan=basic&search=acme
///
/// Newest first. Pagination counts are returned under `meta`.
pub async fn tenant_list(
    context: SecurityContext,
    State(service): State<Arc<TenantService>>,
    State(settings): State<ApiSettings>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Tenant>> {
    context.require_permission(TENANTS_MANAGE)?;

    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.size.unwrap_or(settings.default_page_size),
        settings.max_page_size,
    )
    .map_err(|msg| ApiError::field_error("page", msg))?;

    let filter = TenantFilter {
        status: query.status,
        plan: query.plan,
        search: query.search,
        include_deleted: query.include_deleted,
    };

    Ok(ApiResponse::page(service.list_tenants(&filter, page).await?))
}
