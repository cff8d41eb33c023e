use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{Claims, TokenVerifier};
use crate::error::ApiError;

/// Grants every permission.
pub const WILDCARD_PERMISSION: &str = "*";
pub const TENANTS_CREATE: &str = "tenants:create";
pub const TENANTS_READ: &str = "tenants:read";
pub const TENANTS_MANAGE: &str = "tenants:manage";

/// Authenticated caller, built from verified JWT claims only.
#[derive(Clone, Debug, PartialEq)]
pub struct SecurityContext {
    pub user_id: Uuid,
    pub tenant_id: i64,
    pub permissions: BTreeSet<String>,
}

impl From<Claims> for SecurityContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            permissions: claims.permissions.into_iter().collect(),
        }
    }
}

impl SecurityContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(WILDCARD_PERMISSION) || self.permissions.contains(permission)
    }

    pub fn require_permission(&self, permission: &str) -> Result<(), ApiError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!("Missing permission '{}'", permission)))
        }
    }

    /// Callers see their own tenant; platform operators see every tenant.
    pub fn can_access_tenant(&self, tenant_id: i64) -> bool {
        self.tenant_id == tenant_id || self.has_permission(TENANTS_MANAGE)
    }

    pub fn require_tenant_access(&self, tenant_id: i64) -> Result<(), ApiError> {
        if self.can_access_tenant(tenant_id) {
            Ok(())
        } else {
            // Indistinguishable from an id that does not exist.
            Err(ApiError::not_found(format!("Tenant {} not found", tenant_id)))
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SecurityContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Verifies a bearer token when one is present and attaches the caller's
/// [`SecurityContext`]. Requests without a token pass through; gated and
/// management routes reject them later. An `X-Tenant-ID` header is never
/// consulted.
pub async fn jwt_auth_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_jwt_from_headers(request.headers()).map_err(ApiError::unauthorized)? else {
        return Ok(next.run(request).await);
    };

    let claims = verifier.verify(&token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;

    request.extensions_mut().insert(SecurityContext::from(claims));
    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        Some(_) => Err("Empty JWT token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}
