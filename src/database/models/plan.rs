use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Subscription plan tiers offered by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Basic,
    Professional,
    Enterprise,
    Custom,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::Basic => "basic",
            PlanType::Professional => "professional",
            PlanType::Enterprise => "enterprise",
            PlanType::Custom => "custom",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanType::Free),
            "basic" => Ok(PlanType::Basic),
            "professional" => Ok(PlanType::Professional),
            "enterprise" => Ok(PlanType::Enterprise),
            "custom" => Ok(PlanType::Custom),
            other => Err(format!("unknown plan type '{}'", other)),
        }
    }
}

/// Resource ceilings granted by a plan and copied onto each tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    pub max_users: i32,
    pub max_employees: i32,
    pub max_storage_gb: i32,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            max_users: 5,
            max_employees: 50,
            max_storage_gb: 1,
        }
    }
}

/// Catalog entry for a subscription plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub name: String,
    pub plan_type: PlanType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub monthly_price: Decimal,
    #[serde(default)]
    pub yearly_price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(flatten)]
    pub quotas: Quotas,
    pub enabled_modules: BTreeSet<String>,
    #[serde(default)]
    pub feature_flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub trial_days: u32,
    #[serde(default = "default_support_tier")]
    pub support_tier: String,
}

impl SubscriptionPlan {
    pub fn has_trial(&self) -> bool {
        self.trial_days > 0
    }

    pub fn includes_module(&self, module: &str) -> bool {
        self.enabled_modules.contains(module)
    }
}

/// Catalog entry describing one optional capability area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_support_tier() -> String {
    "basic".to_string()
}
