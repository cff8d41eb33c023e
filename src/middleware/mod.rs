pub mod auth;
pub mod module_access;
pub mod response;
pub mod tenant_handle;

pub use auth::{jwt_auth_middleware, SecurityContext};
pub use module_access::module_access_middleware;
pub use response::{ApiResponse, ApiResult};
pub use tenant_handle::tenant_handle_middleware;
