pub mod auth;
pub mod permission;
pub mod response;
pub mod super_admin;
pub mod tenant_scope;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use permission::check_permissions;
pub use response::{ApiResponse, ApiResult};
pub use super_admin::{super_admin_middleware, SuperAdminUser};
pub use tenant_scope::{tenant_scope_middleware, Membership};
