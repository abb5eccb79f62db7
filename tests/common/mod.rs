#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use fieldops_api::auth::{generate_jwt, password_digest, Claims};
use fieldops_api::permissions::WILDCARD_KEY;
use fieldops_api::server;
use fieldops_api::state::AppState;
use fieldops_api::store::registry::entity;
use fieldops_api::store::{Datastore, MemoryStore};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let router = server::app(AppState::new(store.clone()));
    TestApp { router, store }
}

pub struct Member {
    pub token: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub tenant_user_id: Uuid,
}

pub async fn seed_tenant(store: &dyn Datastore, name: &str) -> Uuid {
    let tenant = store
        .create(entity::TENANTS, json!({ "name": name, "is_active": true }))
        .await
        .unwrap();
    Uuid::parse_str(tenant["id"].as_str().unwrap()).unwrap()
}

/// Seed a user, an (in)active membership and its permission grants, and mint
/// a token the way login would.
pub async fn seed_member(
    store: &dyn Datastore,
    tenant_id: Uuid,
    email: &str,
    keys: &[&str],
    active: bool,
) -> Member {
    let user = store
        .create(
            entity::USERS,
            json!({
                "email": email,
                "name": email,
                "password_digest": password_digest("secret"),
            }),
        )
        .await
        .unwrap();
    let user_id = Uuid::parse_str(user["id"].as_str().unwrap()).unwrap();

    let membership = store
        .create(
            entity::TENANT_USERS,
            json!({
                "tenant_id": tenant_id,
                "user_id": user_id,
                "is_active": active,
            }),
        )
        .await
        .unwrap();
    let tenant_user_id = Uuid::parse_str(membership["id"].as_str().unwrap()).unwrap();

    for key in keys {
        grant(store, tenant_id, tenant_user_id, key).await;
    }

    let is_owner = keys.contains(&WILDCARD_KEY);
    let claims = Claims::for_member(
        user_id,
        email.to_string(),
        email.to_string(),
        tenant_id,
        tenant_user_id,
        keys.iter().map(|k| k.to_string()).collect(),
        is_owner,
    );

    Member {
        token: generate_jwt(&claims).unwrap(),
        user_id,
        tenant_id,
        tenant_user_id,
    }
}

pub async fn grant(store: &dyn Datastore, tenant_id: Uuid, tenant_user_id: Uuid, key: &str) {
    let permission = store
        .create(
            entity::PERMISSIONS,
            json!({ "tenant_id": tenant_id, "key": key }),
        )
        .await
        .unwrap();
    store
        .create(
            entity::TENANT_USER_PERMISSIONS,
            json!({
                "tenant_id": tenant_id,
                "tenant_user_id": tenant_user_id,
                "permission_id": permission["id"],
            }),
        )
        .await
        .unwrap();
}

pub async fn seed_ticket(store: &dyn Datastore, tenant_id: Uuid, title: &str) -> Uuid {
    let ticket = store
        .create(
            entity::TICKETS,
            json!({
                "tenant_id": tenant_id,
                "title": title,
                "status": "open",
                "created_at": chrono::Utc::now(),
            }),
        )
        .await
        .unwrap();
    Uuid::parse_str(ticket["id"].as_str().unwrap()).unwrap()
}

pub async fn seed_super_admin(store: &dyn Datastore, email: &str) -> String {
    let admin = store
        .create(
            entity::SUPER_ADMINS,
            json!({ "email": email, "name": email, "is_active": true }),
        )
        .await
        .unwrap();
    let admin_id = Uuid::parse_str(admin["id"].as_str().unwrap()).unwrap();
    let claims = Claims::for_super_admin(admin_id, email.to_string(), email.to_string());
    generate_jwt(&claims).unwrap()
}

pub async fn request(
    router: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
