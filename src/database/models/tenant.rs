use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plan::{PlanType, Quotas, SubscriptionPlan};

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 50;

/// Tenant lifecycle state. This is the only status type in the crate;
/// every transition goes through [`TenantStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Trial,
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Trial => "trial",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Cancelled => "cancelled",
            TenantStatus::Expired => "expired",
        }
    }

    /// Business operations may only be authorized in these states.
    pub fn permits_operation(&self) -> bool {
        matches!(self, TenantStatus::Active | TenantStatus::Trial)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TenantStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: TenantStatus) -> bool {
        use TenantStatus::*;
        matches!(
            (self, next),
            (Pending, Trial | Active)
                | (Trial, Active | Suspended | Cancelled | Expired)
                | (Active, Trial | Suspended | Cancelled | Expired)
                | (Suspended, Active)
                | (Expired, Active | Trial)
        )
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TenantStatus::Pending),
            "trial" => Ok(TenantStatus::Trial),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "cancelled" => Ok(TenantStatus::Cancelled),
            "expired" => Ok(TenantStatus::Expired),
            other => Err(format!("unknown tenant status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
    Custom,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::Custom => "custom",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "yearly" => Ok(BillingCycle::Yearly),
            "custom" => Ok(BillingCycle::Custom),
            other => Err(format!("unknown billing cycle '{}'", other)),
        }
    }
}

/// Live consumption counters kept on the tenant row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    pub current_users: i32,
    pub current_employees: i32,
    pub current_storage_gb: Decimal,
}

/// Organization metadata supplied when a tenant is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub name: String,
    pub slug: String,
    pub contact_email: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
}

impl Default for TenantProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            slug: String::new(),
            contact_email: String::new(),
            domain: None,
            subdomain: None,
            contact_phone: None,
            company_name: None,
            company_size: None,
            industry: None,
            website: None,
            billing_cycle: BillingCycle::default(),
            timezone: default_timezone(),
            locale: default_locale(),
            currency: default_currency(),
            custom_fields: BTreeMap::new(),
        }
    }
}

impl TenantProfile {
    /// Trim and lower-case user input, then validate it.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_string();
        if self.name.len() < 2 || self.name.len() > 255 {
            return Err("Tenant name must be between 2 and 255 characters".to_string());
        }
        self.slug = normalize_slug(&self.slug)?;
        self.contact_email = self.contact_email.trim().to_ascii_lowercase();
        if !looks_like_email(&self.contact_email) {
            return Err(format!("Invalid contact email '{}'", self.contact_email));
        }
        Ok(self)
    }
}

/// A tenant row that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTenant {
    pub profile: TenantProfile,
    pub status: TenantStatus,
    pub plan: PlanType,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub quotas: Quotas,
    pub usage: UsageCounters,
    pub enabled_modules: BTreeSet<String>,
    pub feature_flags: BTreeMap<String, bool>,
    pub monthly_rate: Decimal,
    pub support_tier: String,
    pub notes: Option<String>,
}

impl NewTenant {
    /// Builds a `PENDING` tenant carrying a copy of the plan's grant.
    pub fn from_plan(profile: TenantProfile, plan: &SubscriptionPlan) -> Self {
        Self {
            profile,
            status: TenantStatus::Pending,
            plan: plan.plan_type,
            trial_ends_at: None,
            subscription_ends_at: None,
            quotas: plan.quotas,
            usage: UsageCounters::default(),
            enabled_modules: plan.enabled_modules.clone(),
            feature_flags: plan.feature_flags.clone(),
            monthly_rate: plan.monthly_price,
            support_tier: plan.support_tier.clone(),
            notes: None,
        }
    }

    /// Leave `PENDING` for the plan's initial state: `TRIAL` when the plan
    /// has a trial window, `ACTIVE` otherwise.
    pub fn enter_initial_state(&mut self, trial_days: u32, now: DateTime<Utc>) {
        debug_assert_eq!(self.status, TenantStatus::Pending);
        if trial_days > 0 {
            self.status = TenantStatus::Trial;
            self.trial_ends_at = Some(now + Duration::days(i64::from(trial_days)));
        } else {
            self.status = TenantStatus::Active;
            self.trial_ends_at = None;
        }
    }

    pub fn into_tenant(self, id: i64, now: DateTime<Utc>) -> Tenant {
        let p = self.profile;
        Tenant {
            id,
            name: p.name,
            slug: p.slug,
            domain: p.domain,
            subdomain: p.subdomain,
            contact_email: p.contact_email,
            contact_phone: p.contact_phone,
            company_name: p.company_name,
            company_size: p.company_size,
            industry: p.industry,
            website: p.website,
            timezone: p.timezone,
            locale: p.locale,
            currency: p.currency,
            status: self.status,
            plan: self.plan,
            billing_cycle: p.billing_cycle,
            trial_ends_at: self.trial_ends_at,
            subscription_ends_at: self.subscription_ends_at,
            quotas: self.quotas,
            usage: self.usage,
            enabled_modules: self.enabled_modules,
            feature_flags: self.feature_flags,
            monthly_rate: self.monthly_rate,
            support_tier: self.support_tier,
            custom_fields: p.custom_fields,
            notes: self.notes,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// One customer organization.
///
/// `enabled_modules`, `feature_flags` and `quotas` are a copy of the plan
/// taken when the plan was assigned. Later catalog edits do not reach an
/// existing tenant until its subscription is updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub company_name: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub timezone: String,
    pub locale: String,
    pub currency: String,
    pub status: TenantStatus,
    pub plan: PlanType,
    pub billing_cycle: BillingCycle,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub quotas: Quotas,
    pub usage: UsageCounters,
    pub enabled_modules: BTreeSet<String>,
    pub feature_flags: BTreeMap<String, bool>,
    pub monthly_rate: Decimal,
    pub support_tier: String,
    pub custom_fields: BTreeMap<String, Value>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True iff the tenant may operate and the module is in its grant.
    pub fn has_module_access(&self, module: &str) -> bool {
        !self.is_deleted() && self.status.permits_operation() && self.enabled_modules.contains(module)
    }

    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.feature_flags.get(feature).copied().unwrap_or(false)
    }

    /// Replace the effective grant with a fresh copy of `plan`.
    pub fn apply_plan(&mut self, plan: &SubscriptionPlan) {
        self.plan = plan.plan_type;
        self.quotas = plan.quotas;
        self.enabled_modules = plan.enabled_modules.clone();
        self.feature_flags = plan.feature_flags.clone();
        self.monthly_rate = plan.monthly_price;
        self.support_tier = plan.support_tier.clone();
    }

    pub fn days_until_trial_end(&self, now: DateTime<Utc>) -> Option<i64> {
        self.trial_ends_at.map(|end| (end - now).num_days().max(0))
    }
}

/// Lower-case and validate a tenant slug.
///
/// Slugs are 3-50 characters of `[a-z0-9_-]` and start with a letter, so
/// the derived partition name is always a valid, unique identifier.
pub fn normalize_slug(raw: &str) -> Result<String, String> {
    let slug = raw.trim().to_ascii_lowercase();
    if slug.len() < SLUG_MIN_LEN || slug.len() > SLUG_MAX_LEN {
        return Err(format!(
            "Slug must be between {} and {} characters",
            SLUG_MIN_LEN, SLUG_MAX_LEN
        ));
    }
    if !slug.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err("Slug must start with a letter".to_string());
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("Slug can only contain letters, numbers, hyphens, and underscores".to_string());
    }
    Ok(slug)
}

pub(crate) fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_terminal() {
        for next in [
            TenantStatus::Pending,
            TenantStatus::Trial,
            TenantStatus::Active,
            TenantStatus::Suspended,
            TenantStatus::Expired,
        ] {
            assert!(!TenantStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn pending_only_leaves_for_trial_or_active() {
        assert!(TenantStatus::Pending.can_transition_to(TenantStatus::Trial));
        assert!(TenantStatus::Pending.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::Pending.can_transition_to(TenantStatus::Suspended));
        assert!(!TenantStatus::Pending.can_transition_to(TenantStatus::Cancelled));
    }

    #[test]
    fn suspended_reactivates_only_to_active() {
        assert!(TenantStatus::Suspended.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::Suspended.can_transition_to(TenantStatus::Trial));
        assert!(!TenantStatus::Suspended.permits_operation());
    }

    #[test]
    fn slug_rules() {
        assert_eq!(normalize_slug(" Acme-Corp ").unwrap(), "acme-corp");
        assert!(normalize_slug("ab").is_err());
        assert!(normalize_slug("9lives").is_err());
        assert!(normalize_slug("acme corp").is_err());
        assert!(normalize_slug("acme\"; drop").is_err());
        assert!(normalize_slug(&"a".repeat(51)).is_err());
    }

    #[test]
    fn profile_normalization_rejects_bad_email() {
        let profile = TenantProfile {
            name: "Acme".into(),
            slug: "ACME".into(),
            contact_email: "not-an-email".into(),
            ..Default::default()
        };
        assert!(profile.normalized().is_err());
    }
}
