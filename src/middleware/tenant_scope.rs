use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::json;
use uuid::Uuid;

use crate::context;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::state::AppState;
use crate::store::registry::entity;

use super::auth::AuthUser;

/// Verified tenant membership for the current request. Handlers use the
/// membership id for permission checks and the tenant id for explicit point
/// predicates.
#[derive(Clone, Debug)]
pub struct Membership {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub is_owner: bool,
}

/// Second guard in the chain: binds the token's tenant to the task-local
/// context for the remainder of the request, then verifies the membership is
/// still active. The binding wraps `next.run()`, so every handler and every
/// store call downstream observes the same tenant, and nothing outside this
/// request can see it.
///
/// Runs strictly after [`jwt_auth_middleware`]; a request that reaches this
/// point without an `AuthUser` extension is a wiring defect.
pub async fn tenant_scope_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    // Super-admin tokens carry no tenant and never bind one.
    if auth.is_super_admin {
        return Err(ApiError::forbidden(
            "Super-admin tokens cannot access tenant APIs",
        ));
    }

    let tenant_id = auth.tenant_id.ok_or_else(|| {
        ApiError::TenantContextMissing("Token carries no tenant binding".to_string())
    })?;
    let tenant_user_id = auth.tenant_user_id.ok_or_else(|| {
        ApiError::TenantContextMissing("Token carries no tenant membership".to_string())
    })?;

    let state = request
        .extensions()
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| ApiError::internal_server_error("Application state not available"))?;

    context::scope(tenant_id, async move {
        let tenant = state
            .store
            .find_first(
                entity::TENANTS,
                FilterData::with_where(json!({ "id": tenant_id, "is_active": true })),
            )
            .await?;
        if tenant.is_none() {
            tracing::warn!(%tenant_id, user_id = %auth.user_id, "request for inactive tenant");
            return Err(ApiError::forbidden("Tenant is not active"));
        }

        let membership = state
            .store
            .find_first(
                entity::TENANT_USERS,
                FilterData::with_where(json!({
                    "id": tenant_user_id,
                    "user_id": auth.user_id,
                    "is_active": true,
                })),
            )
            .await?;
        if membership.is_none() {
            tracing::warn!(
                %tenant_id,
                user_id = %auth.user_id,
                "token membership is missing or deactivated"
            );
            return Err(ApiError::forbidden(
                "User is not an active member of this tenant",
            ));
        }

        request.extensions_mut().insert(Membership {
            id: tenant_user_id,
            tenant_id,
            user_id: auth.user_id,
            is_owner: auth.is_owner,
        });

        Ok(next.run(request).await)
    })
    .await
}
