use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::password_digest;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, SuperAdminUser};
use crate::permissions::WILDCARD_KEY;
use crate::state::AppState;
use crate::store::registry::entity;

use super::uuid_field;

/// Permission catalog seeded into every new tenant. The reserved `*` key is
/// created alongside and granted to the owner membership.
pub const DEFAULT_PERMISSION_KEYS: &[&str] = &[
    "tickets:read",
    "tickets:create",
    "tickets:update",
    "tickets:assign",
    "tickets:start",
    "tickets:finish",
    "zones:read",
    "zones:create",
    "zones:update",
    "zones:delete",
    "teams:read",
    "teams:create",
    "teams:update",
    "teams:delete",
    "users:read",
    "users:invite",
    "users:update",
    "invoices:read",
    "invoices:create",
];

/// GET /admin/tenants. Explicitly cross-tenant via the privileged path.
pub async fn list_tenants(Extension(state): Extension<AppState>) -> ApiResult<Value> {
    let rows = state
        .store
        .unscoped()
        .find_many(
            entity::TENANTS,
            FilterData {
                order: Some(json!({ "created_at": "asc" })),
                ..Default::default()
            },
        )
        .await?;
    Ok(ApiResponse::success(json!(rows)))
}

#[derive(Debug, Deserialize)]
pub struct ProvisionTenantRequest {
    pub name: String,
    pub owner_email: String,
    pub owner_name: String,
    pub owner_password: String,
}

/// POST /admin/tenants. Provisions a tenant company: the tenant row, the
/// owner user (reused when the email already exists), the owner membership,
/// the seeded permission catalog, and the wildcard grant that designates
/// ownership.
pub async fn provision_tenant(
    Extension(state): Extension<AppState>,
    Extension(admin): Extension<SuperAdminUser>,
    Json(payload): Json<ProvisionTenantRequest>,
) -> ApiResult<Value> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Tenant name is required"));
    }
    if payload.owner_email.trim().is_empty() || payload.owner_password.is_empty() {
        return Err(ApiError::bad_request("Owner credentials are required"));
    }

    let store = state.store.unscoped();
    let now = Utc::now();

    let existing = store
        .find_first(
            entity::TENANTS,
            FilterData::with_where(json!({ "name": payload.name })),
        )
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("A tenant with this name already exists"));
    }

    let tenant = store
        .create(
            entity::TENANTS,
            json!({
                "name": payload.name,
                "is_active": true,
                "created_at": now,
            }),
        )
        .await?;
    let tenant_id = uuid_field(&tenant, "id")?;

    let user = match store
        .find_first(
            entity::USERS,
            FilterData::with_where(json!({ "email": payload.owner_email })),
        )
        .await?
    {
        Some(user) => user,
        None => {
            store
                .create(
                    entity::USERS,
                    json!({
                        "email": payload.owner_email,
                        "name": payload.owner_name,
                        "password_digest": password_digest(&payload.owner_password),
                        "created_at": now,
                    }),
                )
                .await?
        }
    };
    let user_id = uuid_field(&user, "id")?;

    let membership = store
        .create(
            entity::TENANT_USERS,
            json!({
                "tenant_id": tenant_id,
                "user_id": user_id,
                "is_active": true,
                "created_at": now,
            }),
        )
        .await?;
    let tenant_user_id = uuid_field(&membership, "id")?;

    let catalog: Vec<Value> = DEFAULT_PERMISSION_KEYS
        .iter()
        .map(|key| json!({ "tenant_id": tenant_id, "key": key }))
        .collect();
    store.create_many(entity::PERMISSIONS, catalog).await?;

    let wildcard = store
        .create(
            entity::PERMISSIONS,
            json!({ "tenant_id": tenant_id, "key": WILDCARD_KEY }),
        )
        .await?;
    store
        .create(
            entity::TENANT_USER_PERMISSIONS,
            json!({
                "tenant_id": tenant_id,
                "tenant_user_id": tenant_user_id,
                "permission_id": wildcard["id"],
            }),
        )
        .await?;

    tracing::info!(admin = %admin.email, %tenant_id, tenant = %payload.name, "tenant provisioned");

    Ok(ApiResponse::created(json!({
        "tenant": tenant,
        "owner": {
            "user_id": user_id,
            "tenant_user_id": tenant_user_id,
        }
    })))
}
