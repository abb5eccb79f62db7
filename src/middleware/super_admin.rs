use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use serde_json::json;
use uuid::Uuid;

use crate::auth::validate_jwt;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::state::AppState;
use crate::store::registry::entity;

use super::auth::extract_jwt_from_headers;

/// Platform operator identity for the provisioning surface.
#[derive(Clone, Debug)]
pub struct SuperAdminUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Guard for the platform provisioning surface. A disjoint chain from the
/// tenant one: it validates its own token, requires the super-admin claim
/// backed by a live `super_admins` row, and never binds a tenant context.
/// Cross-tenant reads on this surface are explicit and logged, not ambient.
pub async fn super_admin_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;
    let claims = validate_jwt(&token).map_err(|e| ApiError::unauthorized(e.to_string()))?;

    if !claims.is_super_admin {
        tracing::warn!(user_id = %claims.sub, "tenant token presented to admin surface");
        return Err(ApiError::forbidden("Super-admin access required"));
    }

    let state = request
        .extensions()
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| ApiError::internal_server_error("Application state not available"))?;

    // The claim alone is not enough; revoking the row revokes access.
    let admin = state
        .store
        .unscoped()
        .find_first(
            entity::SUPER_ADMINS,
            FilterData::with_where(json!({ "id": claims.sub, "is_active": true })),
        )
        .await?;
    if admin.is_none() {
        tracing::warn!(user_id = %claims.sub, "super-admin row missing or deactivated");
        return Err(ApiError::forbidden("Super-admin access required"));
    }

    request.extensions_mut().insert(SuperAdminUser {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
    });

    Ok(next.run(request).await)
}
