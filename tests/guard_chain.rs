mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{request, seed_member, seed_super_admin, seed_tenant, seed_ticket, test_app};
use fieldops_api::auth::{generate_jwt, Claims};
use fieldops_api::filter::FilterData;
use fieldops_api::server;
use fieldops_api::state::AppState;
use fieldops_api::store::{Datastore, MemoryStore, StoreError};

/// Datastore wrapper that records which entities were touched, to pin the
/// guard ordering (a rejected credential must never reach the store).
struct RecordingStore {
    inner: MemoryStore,
    touched: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            touched: Mutex::new(Vec::new()),
        }
    }

    fn touch(&self, entity: &str) {
        self.touched.lock().unwrap().push(entity.to_string());
    }

    fn touched(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Datastore for RecordingStore {
    async fn find_many(&self, entity: &str, filter: FilterData) -> Result<Vec<Value>, StoreError> {
        self.touch(entity);
        self.inner.find_many(entity, filter).await
    }

    async fn find_first(
        &self,
        entity: &str,
        filter: FilterData,
    ) -> Result<Option<Value>, StoreError> {
        self.touch(entity);
        self.inner.find_first(entity, filter).await
    }

    async fn find_unique(&self, entity: &str, where_: Value) -> Result<Option<Value>, StoreError> {
        self.touch(entity);
        self.inner.find_unique(entity, where_).await
    }

    async fn count(&self, entity: &str, where_: Option<Value>) -> Result<i64, StoreError> {
        self.touch(entity);
        self.inner.count(entity, where_).await
    }

    async fn create(&self, entity: &str, data: Value) -> Result<Value, StoreError> {
        self.touch(entity);
        self.inner.create(entity, data).await
    }

    async fn create_many(&self, entity: &str, data: Vec<Value>) -> Result<u64, StoreError> {
        self.touch(entity);
        self.inner.create_many(entity, data).await
    }

    async fn update_unique(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<Value, StoreError> {
        self.touch(entity);
        self.inner.update_unique(entity, where_, data).await
    }

    async fn update_many(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<u64, StoreError> {
        self.touch(entity);
        self.inner.update_many(entity, where_, data).await
    }

    async fn delete_unique(&self, entity: &str, where_: Value) -> Result<Value, StoreError> {
        self.touch(entity);
        self.inner.delete_unique(entity, where_).await
    }

    async fn delete_many(&self, entity: &str, where_: Value) -> Result<u64, StoreError> {
        self.touch(entity);
        self.inner.delete_many(entity, where_).await
    }

    async fn upsert(
        &self,
        entity: &str,
        where_: Value,
        create: Value,
        update: Value,
    ) -> Result<Value, StoreError> {
        self.touch(entity);
        self.inner.upsert(entity, where_, create, update).await
    }
}

#[tokio::test]
async fn invalid_credential_never_reaches_the_store() {
    let store = Arc::new(RecordingStore::new());
    let router = server::app(AppState::new(store.clone()));

    let (status, body) = request(&router, "GET", "/api/tickets", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!("UNAUTHORIZED"));

    let (status, _) = request(&router, "GET", "/api/tickets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let touched = store.touched();
    assert!(
        touched.is_empty(),
        "rejected credential reached the store: {:?}",
        touched
    );
}

#[tokio::test]
async fn inactive_membership_is_forbidden_before_permissions() {
    let app = test_app();
    let tenant = seed_tenant(app.store.as_ref(), "Acme").await;
    let member = seed_member(
        app.store.as_ref(),
        tenant,
        "ex@acme.example",
        &["tickets:read"],
        false,
    )
    .await;

    let (status, body) = request(&app.router, "GET", "/api/tickets", Some(&member.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // Membership verification fails first; the permission layer never runs.
    assert_eq!(body["code"], json!("FORBIDDEN"));
}

#[tokio::test]
async fn token_without_tenant_binding_is_rejected() {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Uuid::new_v4(),
        email: "stray@example.com".to_string(),
        name: "Stray".to_string(),
        tenant_id: None,
        tenant_user_id: None,
        permissions: vec![],
        is_owner: false,
        is_super_admin: false,
        exp: now + 3600,
        iat: now,
    };
    let token = generate_jwt(&claims).unwrap();

    let app = test_app();
    let (status, body) = request(&app.router, "GET", "/api/tickets", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("TENANT_CONTEXT_MISSING"));
}

#[tokio::test]
async fn permission_requirements_are_per_route() {
    let app = test_app();
    let tenant = seed_tenant(app.store.as_ref(), "Acme").await;
    let member = seed_member(
        app.store.as_ref(),
        tenant,
        "tech@acme.example",
        &["tickets:update"],
        true,
    )
    .await;
    let colleague = seed_member(app.store.as_ref(), tenant, "crew@acme.example", &[], true).await;
    let ticket = seed_ticket(app.store.as_ref(), tenant, "pump leak").await;

    // tickets:update lets the member edit...
    let (status, _) = request(
        &app.router,
        "PATCH",
        &format!("/api/tickets/{}", ticket),
        Some(&member.token),
        Some(json!({ "title": "pump leak (urgent)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // ...but not assign, which wants a different key.
    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/api/tickets/{}/assign", ticket),
        Some(&member.token),
        Some(json!({ "assignee_id": colleague.tenant_user_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("MISSING_PERMISSION"));

    // The wildcard grant flips the outcome without re-issuing the token.
    common::grant(app.store.as_ref(), tenant, member.tenant_user_id, "*").await;
    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/api/tickets/{}/assign", ticket),
        Some(&member.token),
        Some(json!({ "assignee_id": colleague.tenant_user_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_and_tenant_surfaces_are_disjoint() {
    let app = test_app();
    let tenant = seed_tenant(app.store.as_ref(), "Acme").await;
    let member = seed_member(
        app.store.as_ref(),
        tenant,
        "owner@acme.example",
        &["*"],
        true,
    )
    .await;
    let admin_token = seed_super_admin(app.store.as_ref(), "root@platform.example").await;

    // Super-admin token on the tenant surface.
    let (status, _) = request(&app.router, "GET", "/api/tickets", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Tenant token on the admin surface, even for an owner.
    let (status, _) = request(&app.router, "GET", "/admin/tenants", Some(&member.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn provisioning_login_and_wildcard_flow() {
    let app = test_app();
    let admin_token = seed_super_admin(app.store.as_ref(), "root@platform.example").await;

    let (status, _) = request(
        &app.router,
        "POST",
        "/admin/tenants",
        Some(&admin_token),
        Some(json!({
            "name": "Acme Plumbing",
            "owner_email": "owner@acme.example",
            "owner_name": "Avery",
            "owner_password": "hunter2",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = request(
        &app.router,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "owner@acme.example", "password": "hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["is_owner"], json!(true));
    let token = body["data"]["token"].as_str().unwrap().to_string();

    // The wildcard grant carries every ticket permission.
    let (status, _) = request(
        &app.router,
        "POST",
        "/api/tickets",
        Some(&token),
        Some(json!({ "title": "first job" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = request(&app.router, "GET", "/api/tickets", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Wrong password still dies at the first gate.
    let (status, _) = request(
        &app.router,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "owner@acme.example", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
