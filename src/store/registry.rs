use std::collections::HashMap;

use super::error::StoreError;

/// Entity name constants for the known schema.
pub mod entity {
    pub const TENANTS: &str = "tenants";
    pub const USERS: &str = "users";
    pub const SUPER_ADMINS: &str = "super_admins";
    pub const TENANT_USERS: &str = "tenant_users";
    pub const PERMISSIONS: &str = "permissions";
    pub const TENANT_USER_PERMISSIONS: &str = "tenant_user_permissions";
    pub const TICKETS: &str = "tickets";
    pub const TICKET_COMMENTS: &str = "ticket_comments";
    pub const ZONES: &str = "zones";
    pub const TEAMS: &str = "teams";
    pub const INVOICES: &str = "invoices";
}

/// Static map of entity type to tenant-scoping, built once at startup from
/// the known schema. The interceptor consults this instead of reflecting on
/// runtime models, so the set of isolated entities is auditable in one
/// place. Unknown entities are a configuration error, not a pass-through.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: HashMap<&'static str, bool>,
}

impl EntityRegistry {
    pub fn new(entries: &[(&'static str, bool)]) -> Self {
        Self {
            entities: entries.iter().copied().collect(),
        }
    }

    /// The application schema. Global identity and the tenant catalog itself
    /// are intentionally unscoped; everything a tenant owns carries a
    /// `tenant_id` column and is isolated by the interceptor.
    pub fn for_schema() -> Self {
        Self::new(&[
            (entity::TENANTS, false),
            (entity::USERS, false),
            (entity::SUPER_ADMINS, false),
            (entity::TENANT_USERS, true),
            (entity::PERMISSIONS, true),
            (entity::TENANT_USER_PERMISSIONS, true),
            (entity::TICKETS, true),
            (entity::TICKET_COMMENTS, true),
            (entity::ZONES, true),
            (entity::TEAMS, true),
            (entity::INVOICES, true),
        ])
    }

    pub fn is_tenant_scoped(&self, entity: &str) -> Result<bool, StoreError> {
        self.entities
            .get(entity)
            .copied()
            .ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))
    }
}
