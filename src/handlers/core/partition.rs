// handlers/core/partition.rs - GET /api/v1/core/partition

use std::sync::Arc;

use axum::{extract::State, Extension};
use serde::Serialize;

use crate::database::partition::{PartitionBackend, PartitionRouter, TenantHandle};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TenantScope;

#[derive(Debug, Serialize)]
pub struct PartitionInfo {
    pub tenant_id: i64,
    pub slug: String,
    pub partition: String,
    /// Namespace the tenant's pooled sessions actually resolve names in.
    pub active_namespace: String,
}

/// GET /api/v1/core/partition - which partition serves the caller
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "tenant_id": 12,
///     "slug": "acme",
///     "partition": "tenant_acme",
///     "active_namespace": "tenant_acme"
///   }
/// }
/// ```
pub async fn partition_info<B: PartitionBackend>(
    State(router): State<Arc<PartitionRouter<B>>>,
    Extension(scope): Extension<TenantScope>,
    Extension(handle): Extension<TenantHandle<B::Pool>>,
) -> ApiResult<PartitionInfo> {
    let active_namespace = router.backend().active_namespace(&handle.pool).await?;

    Ok(ApiResponse::success(PartitionInfo {
        tenant_id: scope.tenant_id,
        slug: scope.slug,
        partition: handle.partition.to_string(),
        active_namespace,
    }))
}
