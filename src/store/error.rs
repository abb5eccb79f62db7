use thiserror::Error;

use crate::filter::FilterError;

/// Kinds of data-access operations, used to pick the scoping policy and to
/// label denial errors for security logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    FindMany,
    FindFirst,
    FindUnique,
    Count,
    Create,
    CreateMany,
    UpdateUnique,
    UpdateMany,
    DeleteUnique,
    DeleteMany,
    Upsert,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FindMany => "find_many",
            OperationKind::FindFirst => "find_first",
            OperationKind::FindUnique => "find_unique",
            OperationKind::Count => "count",
            OperationKind::Create => "create",
            OperationKind::CreateMany => "create_many",
            OperationKind::UpdateUnique => "update_unique",
            OperationKind::UpdateMany => "update_many",
            OperationKind::DeleteUnique => "delete_unique",
            OperationKind::DeleteMany => "delete_many",
            OperationKind::Upsert => "upsert",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the data-access layer and the tenant-scoping interceptor.
/// Isolation violations are distinguishable from each other and from plain
/// database failures so the HTTP boundary can report them precisely.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tenant context missing")]
    ContextMissing,

    #[error("Tenant isolation requires an explicit tenant_id predicate for {operation} on '{entity}'")]
    PredicateRequired {
        entity: String,
        operation: OperationKind,
    },

    #[error("Cross-tenant access denied for {operation} on '{entity}'")]
    CrossTenantDenied {
        entity: String,
        operation: OperationKind,
    },

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Invalid payload for '{entity}': {message}")]
    InvalidPayload { entity: String, message: String },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}
