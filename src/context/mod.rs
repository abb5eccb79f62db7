use std::future::Future;

use uuid::Uuid;

use crate::store::StoreError;

tokio::task_local! {
    /// Tenant id bound for the dynamic extent of one request.
    static CURRENT_TENANT: Uuid;
}

/// Run `fut` with `tenant_id` bound as the ambient tenant for its entire
/// dynamic extent, including every await point inside it. The binding is
/// released when the future completes or is dropped (cancellation), so a
/// pooled worker never carries a stale tenant into an unrelated request.
pub async fn scope<F>(tenant_id: Uuid, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_TENANT.scope(tenant_id, fut).await
}

/// Tenant id bound by the innermost enclosing [`scope`] on the current
/// logical execution path. Outside any scope this is a hard authorization
/// error, never a default tenant.
pub fn current_tenant_id() -> Result<Uuid, StoreError> {
    CURRENT_TENANT
        .try_with(|id| *id)
        .map_err(|_| StoreError::ContextMissing)
}

/// Non-failing variant for callers that branch on scoped vs unscoped.
pub fn try_current_tenant_id() -> Option<Uuid> {
    CURRENT_TENANT.try_with(|id| *id).ok()
}
