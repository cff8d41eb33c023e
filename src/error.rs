// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::partition::PartitionError;
use crate::database::store::StoreError;
use crate::services::TenantError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.clone());
        ApiError::validation_error(message, Some(field_errors))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::InvalidPlan(_) => ApiError::field_error("plan", err.to_string()),
            TenantError::Validation(msg) => ApiError::validation_error(msg, None),
            TenantError::TenantNotFound(_) => ApiError::not_found(err.to_string()),
            TenantError::DuplicateSlug(_) => ApiError::conflict(err.to_string()),
            TenantError::DuplicateAdminEmail(_) => ApiError::conflict(err.to_string()),
            TenantError::InvalidTransition { .. } => ApiError::conflict(err.to_string()),
            TenantError::QuotaExceeded { .. } => ApiError::conflict(err.to_string()),
            TenantError::ModuleNotGranted => ApiError::forbidden(err.to_string()),
            TenantError::ResourceExhausted(partition) => {
                tracing::warn!(partition = %partition, "Connection resources exhausted");
                ApiError::service_unavailable("Service is busy, please retry")
            }
            TenantError::PartitionProvisioningFailed(e) => {
                tracing::error!("Partition provisioning failed: {}", e);
                ApiError::internal_server_error("Tenant storage could not be provisioned")
            }
            TenantError::Catalog(e) => {
                tracing::error!("Plan catalog error: {}", e);
                ApiError::internal_server_error("Plan catalog is unavailable")
            }
            TenantError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            tracing::warn!("Store unavailable: {}", err);
            return ApiError::service_unavailable("Database temporarily unavailable");
        }
        // Don't expose internal SQL errors to clients
        tracing::error!("Store error: {}", err);
        ApiError::internal_server_error("An error occurred while processing your request")
    }
}

impl From<PartitionError> for ApiError {
    fn from(err: PartitionError) -> Self {
        if err.is_retryable() {
            tracing::warn!("Partition unavailable: {}", err);
            return ApiError::service_unavailable("Tenant storage temporarily unavailable");
        }
        TenantError::from(err).into()
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_denial_is_generic() {
        let err: ApiError = TenantError::ModuleNotGranted.into();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "Module not included in your plan");
    }

    #[test]
    fn infrastructure_details_stay_server_side() {
        let err: ApiError = TenantError::Store(StoreError::Database("relation \"tenants\" does not exist".into())).into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.message().contains("relation"));

        let err: ApiError = TenantError::ResourceExhausted("tenant_acme".into()).into();
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn conflicts_and_validation() {
        assert_eq!(ApiError::from(TenantError::DuplicateSlug("acme".into())).status_code(), 409);
        assert_eq!(ApiError::from(TenantError::InvalidPlan("gold".into())).status_code(), 400);
        assert_eq!(ApiError::from(TenantError::not_found(3)).status_code(), 404);
    }
}
