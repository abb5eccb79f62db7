use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, Membership};
use crate::state::AppState;
use crate::store::registry::entity;

// Route permission requirements, declared next to the handlers they guard.
pub const TICKETS_READ: &[&str] = &["tickets:read"];
pub const TICKETS_CREATE: &[&str] = &["tickets:create"];
pub const TICKETS_UPDATE: &[&str] = &["tickets:update"];
pub const TICKETS_ASSIGN: &[&str] = &["tickets:assign"];

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

/// GET /api/tickets. The caller filter only narrows within the bound
/// tenant; the scoped store conjoins the tenant predicate.
pub async fn list_tickets(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Value> {
    let mut conditions = serde_json::Map::new();
    if let Some(status) = query.status {
        conditions.insert("status".to_string(), json!(status));
    }
    if let Some(assignee_id) = query.assignee_id {
        conditions.insert("assignee_id".to_string(), json!(assignee_id));
    }

    let filter = FilterData {
        where_clause: (!conditions.is_empty()).then(|| Value::Object(conditions)),
        order: Some(json!({ "created_at": "desc" })),
        limit: query.limit,
        offset: query.offset,
        ..Default::default()
    };

    let rows = state.store.find_many(entity::TICKETS, filter).await?;
    Ok(ApiResponse::success(json!(rows)))
}

/// GET /api/tickets/:id. Point reads name the tenant explicitly; the
/// scoped store verifies the predicate matches the bound context.
pub async fn get_ticket(
    Extension(state): Extension<AppState>,
    Extension(membership): Extension<Membership>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let row = state
        .store
        .find_unique(
            entity::TICKETS,
            json!({ "id": id, "tenant_id": membership.tenant_id }),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub zone_id: Option<Uuid>,
    pub priority: Option<String>,
}

/// POST /api/tickets. Ownership is stamped by the scoped store, not taken
/// from the payload.
pub async fn create_ticket(
    Extension(state): Extension<AppState>,
    Extension(membership): Extension<Membership>,
    Json(payload): Json<CreateTicketRequest>,
) -> ApiResult<Value> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("Ticket title is required"));
    }

    let now = Utc::now();
    let row = state
        .store
        .create(
            entity::TICKETS,
            json!({
                "title": payload.title,
                "description": payload.description,
                "zone_id": payload.zone_id,
                "priority": payload.priority.unwrap_or_else(|| "normal".to_string()),
                "status": "open",
                "assignee_id": Value::Null,
                "created_by": membership.user_id,
                "created_at": now,
                "updated_at": now,
            }),
        )
        .await?;

    Ok(ApiResponse::created(row))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

/// PATCH /api/tickets/:id
pub async fn update_ticket(
    Extension(state): Extension<AppState>,
    Extension(membership): Extension<Membership>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTicketRequest>,
) -> ApiResult<Value> {
    let mut patch = serde_json::Map::new();
    if let Some(title) = payload.title {
        if title.trim().is_empty() {
            return Err(ApiError::bad_request("Ticket title cannot be empty"));
        }
        patch.insert("title".to_string(), json!(title));
    }
    if let Some(description) = payload.description {
        patch.insert("description".to_string(), json!(description));
    }
    if let Some(status) = payload.status {
        patch.insert("status".to_string(), json!(status));
    }
    if let Some(priority) = payload.priority {
        patch.insert("priority".to_string(), json!(priority));
    }
    if patch.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    patch.insert("updated_at".to_string(), json!(Utc::now()));

    let where_ = json!({ "id": id, "tenant_id": membership.tenant_id });
    state
        .store
        .find_unique(entity::TICKETS, where_.clone())
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;

    let row = state
        .store
        .update_unique(entity::TICKETS, where_, Value::Object(patch))
        .await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assignee_id: Uuid,
}

/// POST /api/tickets/:id/assign. The assignee must be an active membership
/// of the same tenant; the scoped lookup makes a foreign membership
/// invisible rather than assignable.
pub async fn assign_ticket(
    Extension(state): Extension<AppState>,
    Extension(membership): Extension<Membership>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTicketRequest>,
) -> ApiResult<Value> {
    let assignee = state
        .store
        .find_first(
            entity::TENANT_USERS,
            FilterData::with_where(json!({ "id": payload.assignee_id, "is_active": true })),
        )
        .await?;
    if assignee.is_none() {
        return Err(ApiError::bad_request(
            "Assignee is not an active member of this tenant",
        ));
    }

    let where_ = json!({ "id": id, "tenant_id": membership.tenant_id });
    state
        .store
        .find_unique(entity::TICKETS, where_.clone())
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;

    let row = state
        .store
        .update_unique(
            entity::TICKETS,
            where_,
            json!({
                "assignee_id": payload.assignee_id,
                "status": "assigned",
                "updated_at": Utc::now(),
            }),
        )
        .await?;
    Ok(ApiResponse::success(row))
}
