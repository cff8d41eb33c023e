pub mod ledger;
pub mod plan;
pub mod principal;
pub mod tenant;

pub use ledger::{PlanChange, SubscriptionHistory, UsageEvent, UsageLog};
pub use plan::{ModuleDefinition, PlanType, Quotas, SubscriptionPlan};
pub use principal::{AdminPrincipal, Principal, Role, RoleTemplate};
pub use tenant::{BillingCycle, NewTenant, Tenant, TenantProfile, TenantStatus, UsageCounters};
