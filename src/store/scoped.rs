use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::context;
use crate::filter::FilterData;

use super::datastore::Datastore;
use super::error::{OperationKind, StoreError};
use super::registry::EntityRegistry;

/// Wraps every data-access call with the tenant isolation policy, so
/// business logic cannot forget to scope a query and cannot be steered into
/// another tenant's rows by crafted input.
///
/// Policy by operation kind:
/// - bulk reads and bulk writes get the bound tenant conjoined into their
///   filter;
/// - point operations must already carry an explicit, matching `tenant_id`
///   predicate (a unique key can name another tenant's row, so implicit
///   injection is unsafe there);
/// - creates get the bound tenant stamped onto every payload, and a
///   conflicting explicit value fails closed.
///
/// Entities the registry marks unscoped pass through untouched.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn Datastore>,
    registry: Arc<EntityRegistry>,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn Datastore>, registry: Arc<EntityRegistry>) -> Self {
        Self { inner, registry }
    }

    /// The privileged, unscoped data path. Super-admin operations work
    /// across all tenants by design and go through here; the tenant guard
    /// chain never exposes it.
    pub fn unscoped(&self) -> Arc<dyn Datastore> {
        Arc::clone(&self.inner)
    }

    /// Bound tenant for a scoped entity, `None` for unscoped entities.
    /// Consulting an unbound context here is the fatal
    /// [`StoreError::ContextMissing`], never a default tenant.
    fn bound_tenant(&self, entity: &str) -> Result<Option<Uuid>, StoreError> {
        if !self.registry.is_tenant_scoped(entity)? {
            return Ok(None);
        }
        context::current_tenant_id().map(Some)
    }

    pub async fn find_many(
        &self,
        entity: &str,
        mut filter: FilterData,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            filter.where_clause = Some(conjoin_tenant(
                filter.where_clause.take(),
                tenant,
                entity,
                OperationKind::FindMany,
            ));
        }
        self.inner.find_many(entity, filter).await
    }

    pub async fn find_first(
        &self,
        entity: &str,
        mut filter: FilterData,
    ) -> Result<Option<Value>, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            filter.where_clause = Some(conjoin_tenant(
                filter.where_clause.take(),
                tenant,
                entity,
                OperationKind::FindFirst,
            ));
        }
        self.inner.find_first(entity, filter).await
    }

    pub async fn find_unique(
        &self,
        entity: &str,
        where_: Value,
    ) -> Result<Option<Value>, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            require_tenant_predicate(&where_, tenant, entity, OperationKind::FindUnique)?;
        }
        self.inner.find_unique(entity, where_).await
    }

    pub async fn count(&self, entity: &str, where_: Option<Value>) -> Result<i64, StoreError> {
        let where_ = match self.bound_tenant(entity)? {
            Some(tenant) => Some(conjoin_tenant(where_, tenant, entity, OperationKind::Count)),
            None => where_,
        };
        self.inner.count(entity, where_).await
    }

    pub async fn create(&self, entity: &str, mut data: Value) -> Result<Value, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            stamp_tenant(&mut data, tenant, entity, OperationKind::Create)?;
        }
        self.inner.create(entity, data).await
    }

    pub async fn create_many(&self, entity: &str, mut data: Vec<Value>) -> Result<u64, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            for item in data.iter_mut() {
                stamp_tenant(item, tenant, entity, OperationKind::CreateMany)?;
            }
        }
        self.inner.create_many(entity, data).await
    }

    pub async fn update_unique(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<Value, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            require_tenant_predicate(&where_, tenant, entity, OperationKind::UpdateUnique)?;
            forbid_ownership_change(&data, tenant, entity, OperationKind::UpdateUnique)?;
        }
        self.inner.update_unique(entity, where_, data).await
    }

    pub async fn update_many(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<u64, StoreError> {
        let where_ = match self.bound_tenant(entity)? {
            Some(tenant) => {
                forbid_ownership_change(&data, tenant, entity, OperationKind::UpdateMany)?;
                conjoin_tenant(Some(where_), tenant, entity, OperationKind::UpdateMany)
            }
            None => where_,
        };
        self.inner.update_many(entity, where_, data).await
    }

    pub async fn delete_unique(&self, entity: &str, where_: Value) -> Result<Value, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            require_tenant_predicate(&where_, tenant, entity, OperationKind::DeleteUnique)?;
        }
        self.inner.delete_unique(entity, where_).await
    }

    pub async fn delete_many(&self, entity: &str, where_: Value) -> Result<u64, StoreError> {
        let where_ = match self.bound_tenant(entity)? {
            Some(tenant) => conjoin_tenant(Some(where_), tenant, entity, OperationKind::DeleteMany),
            None => where_,
        };
        self.inner.delete_many(entity, where_).await
    }

    pub async fn upsert(
        &self,
        entity: &str,
        where_: Value,
        mut create: Value,
        update: Value,
    ) -> Result<Value, StoreError> {
        if let Some(tenant) = self.bound_tenant(entity)? {
            require_tenant_predicate(&where_, tenant, entity, OperationKind::Upsert)?;
            stamp_tenant(&mut create, tenant, entity, OperationKind::Upsert)?;
            forbid_ownership_change(&update, tenant, entity, OperationKind::Upsert)?;
        }
        self.inner.upsert(entity, where_, create, update).await
    }
}

/// Conjoin `tenant_id = tenant` into a caller-supplied predicate, keeping
/// the caller's conditions intact.
fn conjoin_tenant(where_: Option<Value>, tenant: Uuid, entity: &str, operation: OperationKind) -> Value {
    tracing::debug!(
        entity,
        operation = operation.as_str(),
        bound = %tenant,
        "tenant predicate conjoined"
    );
    let tenant_clause = json!({ "tenant_id": tenant });
    match where_ {
        None => tenant_clause,
        Some(Value::Null) => tenant_clause,
        Some(existing) => json!({ "$and": [existing, tenant_clause] }),
    }
}

/// Point operations must prove intent: the caller's predicate has to name
/// the bound tenant explicitly at the top level.
fn require_tenant_predicate(
    where_: &Value,
    tenant: Uuid,
    entity: &str,
    operation: OperationKind,
) -> Result<(), StoreError> {
    match where_.get("tenant_id") {
        None => Err(StoreError::PredicateRequired {
            entity: entity.to_string(),
            operation,
        }),
        Some(value) => {
            let claimed = value.as_str().and_then(|s| Uuid::parse_str(s).ok());
            if claimed == Some(tenant) {
                Ok(())
            } else {
                tracing::warn!(
                    entity,
                    operation = operation.as_str(),
                    claimed = %value,
                    bound = %tenant,
                    "cross-tenant predicate rejected"
                );
                Err(StoreError::CrossTenantDenied {
                    entity: entity.to_string(),
                    operation,
                })
            }
        }
    }
}

/// Stamp ownership onto a create payload; an explicit conflicting value
/// fails closed.
fn stamp_tenant(
    data: &mut Value,
    tenant: Uuid,
    entity: &str,
    operation: OperationKind,
) -> Result<(), StoreError> {
    let obj = data
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidPayload {
            entity: entity.to_string(),
            message: "payload must be a JSON object".to_string(),
        })?;

    if let Some(existing) = obj.get("tenant_id") {
        let claimed = existing.as_str().and_then(|s| Uuid::parse_str(s).ok());
        if claimed != Some(tenant) {
            tracing::warn!(
                entity,
                operation = operation.as_str(),
                claimed = %existing,
                bound = %tenant,
                "cross-tenant write rejected"
            );
            return Err(StoreError::CrossTenantDenied {
                entity: entity.to_string(),
                operation,
            });
        }
    }
    obj.insert("tenant_id".to_string(), json!(tenant));
    Ok(())
}

/// Ownership is immutable after creation: update payloads may not retarget
/// `tenant_id`.
fn forbid_ownership_change(
    data: &Value,
    tenant: Uuid,
    entity: &str,
    operation: OperationKind,
) -> Result<(), StoreError> {
    if let Some(value) = data.get("tenant_id") {
        let claimed = value.as_str().and_then(|s| Uuid::parse_str(s).ok());
        if claimed != Some(tenant) {
            tracing::warn!(
                entity,
                operation = operation.as_str(),
                claimed = %value,
                bound = %tenant,
                "ownership retarget rejected"
            );
            return Err(StoreError::CrossTenantDenied {
                entity: entity.to_string(),
                operation,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::registry::entity;

    fn scoped_store() -> ScopedStore {
        ScopedStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EntityRegistry::for_schema()),
        )
    }

    async fn seed_two_tenants(store: &ScopedStore) -> (Uuid, Uuid) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for (tenant, title) in [(a, "a1"), (a, "a2"), (b, "b1")] {
            crate::context::scope(tenant, async {
                store
                    .create(entity::TICKETS, json!({"title": title, "status": "open"}))
                    .await
                    .unwrap();
            })
            .await;
        }
        (a, b)
    }

    #[tokio::test]
    async fn bulk_read_is_auto_scoped() {
        let store = scoped_store();
        let (a, b) = seed_two_tenants(&store).await;

        let rows = crate::context::scope(a, store.find_many(entity::TICKETS, FilterData::default()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row["tenant_id"], json!(a));
        }

        // A caller filter naming the other tenant is conjoined away, not honored.
        let rows = crate::context::scope(
            a,
            store.find_many(
                entity::TICKETS,
                FilterData::with_where(json!({"tenant_id": b})),
            ),
        )
        .await
        .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn unscoped_entities_pass_through() {
        let store = scoped_store();
        // No bound context at all; users is not tenant-scoped.
        store
            .create(entity::USERS, json!({"email": "op@example.com"}))
            .await
            .unwrap();
        let rows = store
            .find_many(entity::USERS, FilterData::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn scoped_access_without_context_is_fatal() {
        let store = scoped_store();
        let err = store
            .find_many(entity::TICKETS, FilterData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ContextMissing));
    }

    #[tokio::test]
    async fn unknown_entity_is_a_config_error() {
        let store = scoped_store();
        let err = crate::context::scope(
            Uuid::new_v4(),
            store.find_many("sessions", FilterData::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::UnknownEntity(_)));
    }

    #[tokio::test]
    async fn point_ops_require_explicit_matching_predicate() {
        let store = scoped_store();
        let (a, b) = seed_two_tenants(&store).await;
        let row = crate::context::scope(a, store.find_many(entity::TICKETS, FilterData::default()))
            .await
            .unwrap()
            .remove(0);
        let id = row["id"].clone();

        // No predicate: fail closed as tenant-context-missing kind.
        let err = crate::context::scope(a, store.find_unique(entity::TICKETS, json!({"id": id})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PredicateRequired { .. }));

        // Mismatched predicate: cross-tenant denial.
        let err = crate::context::scope(
            a,
            store.find_unique(entity::TICKETS, json!({"id": id, "tenant_id": b})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));

        // Matching predicate succeeds.
        let found = crate::context::scope(
            a,
            store.find_unique(entity::TICKETS, json!({"id": id, "tenant_id": a})),
        )
        .await
        .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn point_writes_require_explicit_matching_predicate() {
        let store = scoped_store();
        let (a, b) = seed_two_tenants(&store).await;
        let row = crate::context::scope(a, store.find_many(entity::TICKETS, FilterData::default()))
            .await
            .unwrap()
            .remove(0);
        let id = row["id"].clone();

        let err = crate::context::scope(
            a,
            store.update_unique(
                entity::TICKETS,
                json!({"id": id}),
                json!({"status": "closed"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::PredicateRequired { .. }));

        let err = crate::context::scope(
            a,
            store.update_unique(
                entity::TICKETS,
                json!({"id": id, "tenant_id": b}),
                json!({"status": "closed"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));

        let err = crate::context::scope(a, store.delete_unique(entity::TICKETS, json!({"id": id})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PredicateRequired { .. }));

        let err = crate::context::scope(
            a,
            store.delete_unique(entity::TICKETS, json!({"id": id, "tenant_id": b})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));

        // Matching predicate lets both through.
        let updated = crate::context::scope(
            a,
            store.update_unique(
                entity::TICKETS,
                json!({"id": id, "tenant_id": a}),
                json!({"status": "closed"}),
            ),
        )
        .await
        .unwrap();
        assert_eq!(updated["status"], json!("closed"));

        crate::context::scope(
            a,
            store.delete_unique(entity::TICKETS, json!({"id": id, "tenant_id": a})),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn upsert_composes_predicate_stamp_and_retarget_checks() {
        let store = scoped_store();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let id = Uuid::new_v4();

        let err = crate::context::scope(
            a,
            store.upsert(
                entity::TICKETS,
                json!({"id": id}),
                json!({"id": id, "title": "x"}),
                json!({"title": "y"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::PredicateRequired { .. }));

        let err = crate::context::scope(
            a,
            store.upsert(
                entity::TICKETS,
                json!({"id": id, "tenant_id": b}),
                json!({"id": id, "title": "x"}),
                json!({"title": "y"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));

        // Matching predicate but a create payload claiming the other tenant.
        let err = crate::context::scope(
            a,
            store.upsert(
                entity::TICKETS,
                json!({"id": id, "tenant_id": a}),
                json!({"id": id, "title": "x", "tenant_id": b}),
                json!({"title": "y"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));

        // Clean upsert creates with stamped ownership.
        let created = crate::context::scope(
            a,
            store.upsert(
                entity::TICKETS,
                json!({"id": id, "tenant_id": a}),
                json!({"id": id, "title": "x"}),
                json!({"title": "y"}),
            ),
        )
        .await
        .unwrap();
        assert_eq!(created["tenant_id"], json!(a));

        // Second pass hits the update branch; retargeting is rejected there.
        let err = crate::context::scope(
            a,
            store.upsert(
                entity::TICKETS,
                json!({"id": id, "tenant_id": a}),
                json!({"id": id, "title": "x"}),
                json!({"tenant_id": b}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));

        let updated = crate::context::scope(
            a,
            store.upsert(
                entity::TICKETS,
                json!({"id": id, "tenant_id": a}),
                json!({"id": id, "title": "x"}),
                json!({"title": "y"}),
            ),
        )
        .await
        .unwrap();
        assert_eq!(updated["title"], json!("y"));
    }

    #[tokio::test]
    async fn bulk_delete_only_touches_bound_tenant() {
        let store = scoped_store();
        let (a, b) = seed_two_tenants(&store).await;

        let deleted = crate::context::scope(a, store.delete_many(entity::TICKETS, json!({})))
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let remaining = crate::context::scope(b, store.count(entity::TICKETS, None))
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn create_stamps_ownership_and_rejects_conflicts() {
        let store = scoped_store();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        // Payload without ownership gets stamped.
        let created = crate::context::scope(
            a,
            store.create(entity::TICKETS, json!({"title": "pump leak"})),
        )
        .await
        .unwrap();
        assert_eq!(created["tenant_id"], json!(a));

        // Payload naming the bound tenant is fine.
        crate::context::scope(
            a,
            store.create(entity::TICKETS, json!({"title": "x", "tenant_id": a})),
        )
        .await
        .unwrap();

        // Payload naming another tenant fails closed.
        let err = crate::context::scope(
            a,
            store.create(entity::TICKETS, json!({"title": "x", "tenant_id": b})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));
    }

    #[tokio::test]
    async fn create_many_stamps_every_element() {
        let store = scoped_store();
        let a = Uuid::new_v4();
        crate::context::scope(
            a,
            store.create_many(
                entity::TICKETS,
                vec![json!({"title": "1"}), json!({"title": "2"})],
            ),
        )
        .await
        .unwrap();
        let rows = crate::context::scope(a, store.find_many(entity::TICKETS, FilterData::default()))
            .await
            .unwrap();
        assert!(rows.iter().all(|r| r["tenant_id"] == json!(a)));
    }

    #[tokio::test]
    async fn update_may_not_retarget_ownership() {
        let store = scoped_store();
        let (a, b) = seed_two_tenants(&store).await;
        let err = crate::context::scope(
            a,
            store.update_many(entity::TICKETS, json!({}), json!({"tenant_id": b})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::CrossTenantDenied { .. }));
    }
}
