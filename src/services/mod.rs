pub mod error;
pub mod module_gate;
pub mod tenant_service;
pub mod usage;

pub use error::TenantError;
pub use module_gate::{GateOutcome, ModuleGate, ModuleRouteTable, RouteClass};
pub use tenant_service::{SubscriptionUpdate, TenantScope, TenantService};
pub use usage::{QuotaResource, ResourceUsage, UsageReport};
