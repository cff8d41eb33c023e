use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::database::partition::{PartitionBackend, PartitionRouter};
use crate::error::ApiError;
use crate::services::TenantScope;

/// Resolves the granted tenant's partition handle for business handlers.
/// Layered with `route_layer` on tenant-scoped routes, inside the module gate.
pub async fn tenant_handle_middleware<B: PartitionBackend>(
    State(router): State<Arc<PartitionRouter<B>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let scope = request
        .extensions()
        .get::<TenantScope>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let handle = router.get_handle(&scope.slug).await?;
    request.extensions_mut().insert(handle);
    Ok(next.run(request).await)
}
