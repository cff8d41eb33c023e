use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plan::PlanType;

/// Resource type used by usage events that change the storage counter.
pub const STORAGE_RESOURCE: &str = "storage";
/// Resource type used by lifecycle audit events.
pub const TENANT_RESOURCE: &str = "tenant";

/// One row of the append-only subscription ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionHistory {
    pub id: i64,
    pub tenant_id: i64,
    pub old_plan: PlanType,
    pub new_plan: PlanType,
    pub reason: Option<String>,
    pub initiated_by: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// A plan change waiting to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChange {
    pub old_plan: PlanType,
    pub new_plan: PlanType,
    pub reason: Option<String>,
    pub initiated_by: Option<String>,
}

/// One row of the append-only usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: i64,
    pub tenant_id: i64,
    pub log_date: NaiveDate,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub quantity: Decimal,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A metered event waiting to be appended to the usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub resource_type: String,
    pub action: String,
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl UsageEvent {
    pub fn new(resource_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            action: action.into(),
            quantity: Decimal::ONE,
            resource_id: None,
            metadata: Value::Object(Default::default()),
        }
    }

    /// Audit record for a tenant lifecycle step (created, suspended, ...).
    pub fn lifecycle(action: impl Into<String>) -> Self {
        Self::new(TENANT_RESOURCE, action)
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_storage(&self) -> bool {
        self.resource_type == STORAGE_RESOURCE
    }

    pub fn into_log(self, id: i64, tenant_id: i64, now: DateTime<Utc>) -> UsageLog {
        UsageLog {
            id,
            tenant_id,
            log_date: now.date_naive(),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            action: self.action,
            quantity: self.quantity,
            metadata: self.metadata,
            created_at: now,
        }
    }
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}
