use serde_json::json;
use uuid::Uuid;

use crate::filter::FilterData;
use crate::store::registry::entity;
use crate::store::{ScopedStore, StoreError};

/// The reserved capability key granting every permission for its tenant.
/// Assigned at tenant provisioning time to designate the owner membership.
/// Only this bare sentinel is special; there is no prefix hierarchy
/// (`tickets:*` is an ordinary key that grants nothing beyond itself).
pub const WILDCARD_KEY: &str = "*";

/// Answers capability questions for a tenant membership. Every lookup goes
/// through the scoped store, so the evaluator itself cannot read grants
/// across tenants. No caching: checks are cheap single-row lookups and are
/// expected to be repeated per request.
#[derive(Clone)]
pub struct PermissionService {
    store: ScopedStore,
}

impl PermissionService {
    pub fn new(store: ScopedStore) -> Self {
        Self { store }
    }

    /// True iff a grant exists for exactly `key` (the wildcard does NOT
    /// shortcut this variant; callers asking about a literal key get a
    /// literal answer).
    pub async fn has_permission(
        &self,
        tenant_user_id: Uuid,
        key: &str,
    ) -> Result<bool, StoreError> {
        self.grant_exists(tenant_user_id, &[key]).await
    }

    /// True iff the membership holds the wildcard, or at least one of
    /// `keys`. An empty `keys` slice is vacuously permitted; it is how
    /// endpoints declare "any authenticated member".
    pub async fn has_any_permission(
        &self,
        tenant_user_id: Uuid,
        keys: &[&str],
    ) -> Result<bool, StoreError> {
        if keys.is_empty() {
            return Ok(true);
        }
        // Owner fast path before the specific keys.
        if self.grant_exists(tenant_user_id, &[WILDCARD_KEY]).await? {
            return Ok(true);
        }
        self.grant_exists(tenant_user_id, keys).await
    }

    async fn grant_exists(&self, tenant_user_id: Uuid, keys: &[&str]) -> Result<bool, StoreError> {
        let permissions = self
            .store
            .find_many(
                entity::PERMISSIONS,
                FilterData::with_where(json!({ "key": { "$in": keys } })),
            )
            .await?;
        let permission_ids: Vec<&serde_json::Value> =
            permissions.iter().filter_map(|p| p.get("id")).collect();
        if permission_ids.is_empty() {
            return Ok(false);
        }

        let grant = self
            .store
            .find_first(
                entity::TENANT_USER_PERMISSIONS,
                FilterData::with_where(json!({
                    "tenant_user_id": tenant_user_id,
                    "permission_id": { "$in": permission_ids },
                })),
            )
            .await?;
        Ok(grant.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::store::{EntityRegistry, MemoryStore};
    use std::sync::Arc;

    fn service() -> PermissionService {
        let store = ScopedStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EntityRegistry::for_schema()),
        );
        PermissionService::new(store)
    }

    async fn grant(svc: &PermissionService, tenant_user_id: Uuid, key: &str) {
        let permission = svc
            .store
            .create(entity::PERMISSIONS, json!({ "key": key }))
            .await
            .unwrap();
        svc.store
            .create(
                entity::TENANT_USER_PERMISSIONS,
                json!({
                    "tenant_user_id": tenant_user_id,
                    "permission_id": permission["id"],
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_requirement_is_vacuously_true() {
        let svc = service();
        let tenant = Uuid::new_v4();
        let member = Uuid::new_v4();
        let ok = context::scope(tenant, svc.has_any_permission(member, &[]))
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn specific_grants_intersect_exactly() {
        let svc = service();
        let tenant = Uuid::new_v4();
        let member = Uuid::new_v4();
        context::scope(tenant, grant(&svc, member, "tickets:read")).await;

        let scoped = |keys: &'static [&'static str]| {
            let svc = svc.clone();
            async move {
                context::scope(tenant, async move {
                    svc.has_any_permission(member, keys).await
                })
                .await
                .unwrap()
            }
        };

        assert!(scoped(&["tickets:read"]).await);
        assert!(!scoped(&["tickets:update"]).await);
        assert!(scoped(&["tickets:read", "tickets:update"]).await);
    }

    #[tokio::test]
    async fn wildcard_grant_dominates_every_key() {
        let svc = service();
        let tenant = Uuid::new_v4();
        let owner = Uuid::new_v4();
        context::scope(tenant, grant(&svc, owner, WILDCARD_KEY)).await;

        for key in ["tickets:update", "zones:delete", "anything:at-all"] {
            let ok = context::scope(tenant, svc.has_any_permission(owner, &[key]))
                .await
                .unwrap();
            assert!(ok, "wildcard should satisfy {}", key);
        }
    }

    #[tokio::test]
    async fn prefix_wildcard_grants_nothing() {
        // `tickets:*` is a plain key, not a hierarchy; only the bare `*`
        // sentinel is special.
        let svc = service();
        let tenant = Uuid::new_v4();
        let member = Uuid::new_v4();
        context::scope(tenant, grant(&svc, member, "tickets:*")).await;

        let ok = context::scope(tenant, svc.has_any_permission(member, &["tickets:read"]))
            .await
            .unwrap();
        assert!(!ok);

        // It does match itself as a literal.
        let ok = context::scope(tenant, svc.has_permission(member, "tickets:*"))
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn grants_are_tenant_scoped() {
        let svc = service();
        let (tenant_a, tenant_b) = (Uuid::new_v4(), Uuid::new_v4());
        let member = Uuid::new_v4();
        context::scope(tenant_a, grant(&svc, member, "tickets:read")).await;

        // Same membership id evaluated under another tenant sees nothing.
        let ok = context::scope(tenant_b, svc.has_any_permission(member, &["tickets:read"]))
            .await
            .unwrap();
        assert!(!ok);
    }
}
