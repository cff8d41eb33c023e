// handlers/tenants/mod.rs - Tenant management plane
//
// Mounted under /api/v1/tenants, which the module gate never blocks, so a
// suspended or pending tenant can still inspect and fix its subscription.
// Cross-tenant operations require `tenants:manage`.

pub mod create;       // POST   /api/v1/tenants
pub mod delete;       // DELETE /api/v1/tenants/:id
pub mod history;      // GET    /api/v1/tenants/:id/history
pub mod list;         // GET    /api/v1/tenants
pub mod modules;      // GET    /api/v1/tenants/:id/modules
pub mod plans;        // GET    /api/v1/tenants/plans
pub mod restore;      // POST   /api/v1/tenants/:id/restore
pub mod show;         // GET    /api/v1/tenants/:id, /api/v1/tenants/me
pub mod status;       // POST   /api/v1/tenants/:id/status
pub mod subscription; // POST   /api/v1/tenants/:id/subscription
pub mod usage;        // GET    /api/v1/tenants/:id/usage

pub use create::tenant_create;
pub use delete::tenant_delete;
pub use history::{tenant_history, tenant_usage_logs};
pub use list::tenant_list;
pub use modules::{tenant_module_access, tenant_modules};
pub use plans::plan_list;
pub use restore::tenant_restore;
pub use show::{tenant_me, tenant_show};
pub use status::tenant_status;
pub use subscription::tenant_subscription;
pub use usage::tenant_usage;
