use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::ApiError;
use crate::state::AppState;

use super::tenant_scope::Membership;

/// Final guard in the chain: evaluates route-declared permission keys
/// against the bound membership. Wired per route as
/// `route_layer(from_fn(move |req, next| check_permissions(KEYS, req, next)))`
/// so it runs only when the route matched, after authentication and tenant
/// binding.
///
/// Any single key satisfies the requirement, as does the tenant wildcard
/// grant. Failure is a 403 with its own diagnostic code, distinct from the
/// isolation denials.
pub async fn check_permissions(
    required: &'static [&'static str],
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if required.is_empty() {
        return Ok(next.run(request).await);
    }

    let membership = request
        .extensions()
        .get::<Membership>()
        .cloned()
        .ok_or_else(|| ApiError::forbidden("Tenant membership required"))?;

    let state = request
        .extensions()
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| ApiError::internal_server_error("Application state not available"))?;

    let allowed = state
        .permissions
        .has_any_permission(membership.id, required)
        .await?;

    if !allowed {
        tracing::warn!(
            tenant_id = %membership.tenant_id,
            tenant_user_id = %membership.id,
            required = ?required,
            "permission denied"
        );
        return Err(ApiError::MissingPermission(format!(
            "Missing required permission: {}",
            required.join(", ")
        )));
    }

    Ok(next.run(request).await)
}
