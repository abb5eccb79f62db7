use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

pub mod admin;
pub mod auth;
pub mod tickets;

/// Pull a UUID column out of a JSON row. Rows come back from the store with
/// uuids rendered as strings; a missing or malformed value is a data defect,
/// not client error.
pub(crate) fn uuid_field(row: &Value, key: &str) -> Result<Uuid, ApiError> {
    row.get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            tracing::error!(key, "row is missing a uuid column");
            ApiError::internal_server_error("An error occurred while processing your request")
        })
}

pub(crate) fn str_field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}
