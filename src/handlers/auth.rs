use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{generate_jwt, password_digest, Claims};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};
use crate::permissions::WILDCARD_KEY;
use crate::state::AppState;
use crate::store::registry::entity;

use super::{str_field, uuid_field};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Credential exchange. Runs before any tenant is known, so identity
/// resolution goes through the privileged path directly; nothing here acts
/// on tenant data beyond reading the rows needed to mint the token.
///
/// Picks the first active membership; users belonging to several tenants
/// get a token for one of them and re-authenticate to switch.
pub async fn login(
    Extension(state): Extension<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Value> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let store = state.store.unscoped();

    let user = store
        .find_first(
            entity::USERS,
            FilterData::with_where(json!({ "email": payload.email })),
        )
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let stored_digest = str_field(&user, "password_digest");
    if stored_digest != password_digest(&payload.password) {
        tracing::warn!(email = %payload.email, "failed login attempt");
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let user_id = uuid_field(&user, "id")?;

    let membership = store
        .find_first(
            entity::TENANT_USERS,
            FilterData::with_where(json!({ "user_id": user_id, "is_active": true })),
        )
        .await?
        .ok_or_else(|| ApiError::forbidden("No active tenant membership"))?;

    let tenant_id = uuid_field(&membership, "tenant_id")?;
    let tenant_user_id = uuid_field(&membership, "id")?;

    let permissions = granted_keys(&state, tenant_user_id).await?;
    let is_owner = permissions.iter().any(|k| k == WILDCARD_KEY);

    let claims = Claims::for_member(
        user_id,
        str_field(&user, "email").to_string(),
        str_field(&user, "name").to_string(),
        tenant_id,
        tenant_user_id,
        permissions.clone(),
        is_owner,
    );
    let token = generate_jwt(&claims).map_err(|e| {
        tracing::error!("token generation failed: {}", e);
        ApiError::internal_server_error("An error occurred while processing your request")
    })?;

    tracing::info!(%user_id, %tenant_id, "user logged in");

    Ok(ApiResponse::success(json!({
        "token": token,
        "user": {
            "id": user_id,
            "email": str_field(&user, "email"),
            "name": str_field(&user, "name"),
            "tenant_id": tenant_id,
            "tenant_user_id": tenant_user_id,
            "permissions": permissions,
            "is_owner": is_owner,
        }
    })))
}

/// Permission keys granted to a membership, read through the privileged
/// path (no tenant context is bound during login).
async fn granted_keys(state: &AppState, tenant_user_id: Uuid) -> Result<Vec<String>, ApiError> {
    let store = state.store.unscoped();

    let grants = store
        .find_many(
            entity::TENANT_USER_PERMISSIONS,
            FilterData::with_where(json!({ "tenant_user_id": tenant_user_id })),
        )
        .await?;
    let permission_ids: Vec<Value> = grants
        .iter()
        .filter_map(|g| g.get("permission_id").cloned())
        .collect();
    if permission_ids.is_empty() {
        return Ok(vec![]);
    }

    let permissions = store
        .find_many(
            entity::PERMISSIONS,
            FilterData::with_where(json!({ "id": { "$in": permission_ids } })),
        )
        .await?;
    Ok(permissions
        .iter()
        .filter_map(|p| p.get("key").and_then(|k| k.as_str()))
        .map(str::to_string)
        .collect())
}
