use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::error::ApiError;
use crate::middleware::auth::SecurityContext;
use crate::services::{GateOutcome, ModuleGate, TenantError};

/// Runs the module gate before dispatch. A granted request carries its
/// [`TenantScope`](crate::services::TenantScope) in the extensions.
///
/// Must be layered outside routing so it sees the full request path.
pub async fn module_access_middleware(
    State(gate): State<Arc<ModuleGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let tenant_id = request.extensions().get::<SecurityContext>().map(|c| c.tenant_id);

    match gate.evaluate(&path, tenant_id).await {
        Ok(GateOutcome::Bypass) => Ok(next.run(request).await),
        Ok(GateOutcome::Unauthenticated) => Err(ApiError::unauthorized("Authentication required")),
        Ok(GateOutcome::Granted(scope)) => {
            request.extensions_mut().insert(scope);
            Ok(next.run(request).await)
        }
        Ok(GateOutcome::Denied) => Err(TenantError::ModuleNotGranted.into()),
        Err(e) => {
            error!(path = %path, "Module access check failed: {}", e);
            Err(ApiError::service_unavailable("Access check temporarily unavailable"))
        }
    }
}
