use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::database::models::plan::PlanType;
use crate::database::models::tenant::TenantStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaResource {
    Users,
    Employees,
    Storage,
}

impl fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuotaResource::Users => "users",
            QuotaResource::Employees => "employees",
            QuotaResource::Storage => "storage",
        })
    }
}

impl std::str::FromStr for QuotaResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "users" => Ok(QuotaResource::Users),
            "employees" => Ok(QuotaResource::Employees),
            "storage" => Ok(QuotaResource::Storage),
            other => Err(format!("unknown quota resource '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub current: Decimal,
    pub limit: Decimal,
    pub percentage: f64,
}

impl ResourceUsage {
    pub fn new(current: impl Into<Decimal>, limit: impl Into<Decimal>) -> Self {
        let current = current.into();
        let limit = limit.into();
        let percentage = if limit.is_zero() {
            0.0
        } else {
            match current
                .checked_mul(Decimal::ONE_HUNDRED)
                .and_then(|scaled| scaled.checked_div(limit))
            {
                Some(pct) => pct.round_dp(2).to_f64().unwrap_or(0.0),
                None => {
                    let ratio = current.to_f64().unwrap_or(0.0) / limit.to_f64().unwrap_or(1.0);
                    (ratio * 10_000.0).round() / 100.0
                }
            }
        };
        Self {
            current,
            limit,
            percentage,
        }
    }

    /// An addition too large to represent always exceeds.
    pub fn would_exceed(&self, additional: Decimal) -> bool {
        self.current
            .checked_add(additional)
            .map_or(true, |total| total > self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub tenant_id: i64,
    pub plan: PlanType,
    pub status: TenantStatus,
    pub users: ResourceUsage,
    pub employees: ResourceUsage,
    pub storage: ResourceUsage,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

impl UsageReport {
    pub fn resource(&self, resource: QuotaResource) -> &ResourceUsage {
        match resource {
            QuotaResource::Users => &self.users,
            QuotaResource::Employees => &self.employees,
            QuotaResource::Storage => &self.storage,
        }
    }
}
