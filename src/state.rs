use std::sync::Arc;

use crate::permissions::PermissionService;
use crate::store::{Datastore, EntityRegistry, ScopedStore};

/// Shared application state injected into the request pipeline. Everything
/// reachable from a tenant request goes through the scoped store; the
/// super-admin surface reaches the privileged path via
/// [`ScopedStore::unscoped`].
#[derive(Clone)]
pub struct AppState {
    pub store: ScopedStore,
    pub permissions: PermissionService,
}

impl AppState {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        let registry = Arc::new(EntityRegistry::for_schema());
        let store = ScopedStore::new(datastore, registry);
        let permissions = PermissionService::new(store.clone());
        Self { store, permissions }
    }
}
