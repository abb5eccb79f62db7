use async_trait::async_trait;
use serde_json::Value;

use crate::filter::FilterData;

use super::error::StoreError;

/// Entity-oriented store client. Rows are JSON documents keyed by entity
/// type; filters use the structured grammar from [`crate::filter`].
///
/// Implementations do NOT enforce tenant isolation; that is the job of
/// [`ScopedStore`](super::scoped::ScopedStore), which wraps every call.
/// Handing business logic a bare `Datastore` is the privileged super-admin
/// path.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Liveness probe; no-op for stores without a connection to lose.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_many(&self, entity: &str, filter: FilterData) -> Result<Vec<Value>, StoreError>;

    async fn find_first(
        &self,
        entity: &str,
        filter: FilterData,
    ) -> Result<Option<Value>, StoreError>;

    /// Point read by unique predicate (expected to identify at most one row).
    async fn find_unique(&self, entity: &str, where_: Value) -> Result<Option<Value>, StoreError>;

    async fn count(&self, entity: &str, where_: Option<Value>) -> Result<i64, StoreError>;

    async fn create(&self, entity: &str, data: Value) -> Result<Value, StoreError>;

    async fn create_many(&self, entity: &str, data: Vec<Value>) -> Result<u64, StoreError>;

    async fn update_unique(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<Value, StoreError>;

    async fn update_many(
        &self,
        entity: &str,
        where_: Value,
        data: Value,
    ) -> Result<u64, StoreError>;

    async fn delete_unique(&self, entity: &str, where_: Value) -> Result<Value, StoreError>;

    async fn delete_many(&self, entity: &str, where_: Value) -> Result<u64, StoreError>;

    async fn upsert(
        &self,
        entity: &str,
        where_: Value,
        create: Value,
        update: Value,
    ) -> Result<Value, StoreError>;
}
