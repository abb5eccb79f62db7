use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{from_fn, Next};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config;
use crate::error::ApiError;
use crate::handlers::{admin, auth, tickets};
use crate::middleware::{
    check_permissions, jwt_auth_middleware, super_admin_middleware, tenant_scope_middleware,
};
use crate::state::AppState;

/// Build the application router. The tenant surface sits behind the ordered
/// guard chain (jwt -> tenant binding -> per-route permissions); the admin
/// surface sits behind its own disjoint guard. `/health` and `/auth/login`
/// are public.
pub fn app(state: AppState) -> Router {
    let tenant_api = ticket_routes()
        .layer(from_fn(tenant_scope_middleware))
        .layer(from_fn(jwt_auth_middleware));

    let admin_api = admin_routes().layer(from_fn(super_admin_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .merge(tenant_api)
        .merge(admin_api)
        .layer(Extension(state))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn ticket_routes() -> Router {
    let read = Router::new()
        .route("/api/tickets", get(tickets::list_tickets))
        .route("/api/tickets/:id", get(tickets::get_ticket))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permissions(tickets::TICKETS_READ, req, next)
        }));

    let create = Router::new()
        .route("/api/tickets", post(tickets::create_ticket))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permissions(tickets::TICKETS_CREATE, req, next)
        }));

    let update = Router::new()
        .route("/api/tickets/:id", patch(tickets::update_ticket))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permissions(tickets::TICKETS_UPDATE, req, next)
        }));

    let assign = Router::new()
        .route("/api/tickets/:id/assign", post(tickets::assign_ticket))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permissions(tickets::TICKETS_ASSIGN, req, next)
        }));

    read.merge(create).merge(update).merge(assign)
}

fn admin_routes() -> Router {
    Router::new().route(
        "/admin/tenants",
        get(admin::list_tenants).post(admin::provision_tenant),
    )
}

fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = config::config()
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health(Extension(state): Extension<AppState>) -> Result<Json<Value>, ApiError> {
    state.store.unscoped().health_check().await.map_err(|e| {
        tracing::error!("health check failed: {}", e);
        ApiError::service_unavailable("Datastore unavailable")
    })?;
    Ok(Json(json!({ "status": "healthy" })))
}
