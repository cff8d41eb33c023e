use rust_decimal::Decimal;
use thiserror::Error;

use super::usage::QuotaResource;
use crate::catalog::CatalogError;
use crate::database::models::tenant::TenantStatus;
use crate::database::partition::PartitionError;
use crate::database::store::{DuplicateKind, StoreError};

/// Failures of tenant lifecycle operations.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Plan '{0}' is not available")]
    InvalidPlan(String),

    #[error("Tenant {0} not found")]
    TenantNotFound(String),

    #[error("Slug '{0}' is already in use")]
    DuplicateSlug(String),

    #[error("Email '{0}' is already registered")]
    DuplicateAdminEmail(String),

    #[error("Partition provisioning failed: {0}")]
    PartitionProvisioningFailed(#[source] PartitionError),

    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Deliberately carries no detail about why access was refused.
    #[error("Module not included in your plan")]
    ModuleNotGranted,

    #[error("{0}")]
    Validation(String),

    #[error("Cannot change tenant status from {from} to {to}")]
    InvalidTransition { from: TenantStatus, to: TenantStatus },

    #[error("{resource} quota exceeded: {current} in use, {requested} requested, limit {limit}")]
    QuotaExceeded {
        resource: QuotaResource,
        current: Decimal,
        requested: Decimal,
        limit: Decimal,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TenantError {
    pub fn not_found(id: i64) -> Self {
        TenantError::TenantNotFound(id.to_string())
    }

    /// Callers may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            TenantError::ResourceExhausted(_) => true,
            TenantError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Store conflicts raised by unique indexes, named after the input
    /// that collided.
    pub(crate) fn from_duplicate(kind: DuplicateKind, slug: &str, email: &str) -> Self {
        match kind {
            DuplicateKind::Slug => TenantError::DuplicateSlug(slug.to_string()),
            DuplicateKind::AdminEmail => TenantError::DuplicateAdminEmail(email.to_string()),
        }
    }
}

impl From<PartitionError> for TenantError {
    fn from(err: PartitionError) -> Self {
        match err {
            PartitionError::Exhausted(partition) => TenantError::ResourceExhausted(partition),
            PartitionError::InvalidSlug(slug) => TenantError::Validation(format!("Invalid tenant slug '{}'", slug)),
            other => TenantError::PartitionProvisioningFailed(other),
        }
    }
}
