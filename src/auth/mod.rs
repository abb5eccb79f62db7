use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config;

/// JWT claim set. Tenant fields are absent on super-admin tokens; the two
/// guard chains each reject the other's shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_user_id: Option<Uuid>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_super_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn for_member(
        user_id: Uuid,
        email: String,
        name: String,
        tenant_id: Uuid,
        tenant_user_id: Uuid,
        permissions: Vec<String>,
        is_owner: bool,
    ) -> Self {
        let (iat, exp) = Self::window();
        Self {
            sub: user_id,
            email,
            name,
            tenant_id: Some(tenant_id),
            tenant_user_id: Some(tenant_user_id),
            permissions,
            is_owner,
            is_super_admin: false,
            exp,
            iat,
        }
    }

    pub fn for_super_admin(admin_id: Uuid, email: String, name: String) -> Self {
        let (iat, exp) = Self::window();
        Self {
            sub: admin_id,
            email,
            name,
            tenant_id: None,
            tenant_user_id: None,
            permissions: vec![],
            is_owner: false,
            is_super_admin: true,
            exp,
            iat,
        }
    }

    fn window() -> (i64, i64) {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();
        (now.timestamp(), exp)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    TokenInvalid(String),

    #[error("JWT secret not configured")]
    InvalidSecret,
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str) -> Result<Claims, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| JwtError::TokenInvalid(e.to_string()))?;
    Ok(token_data.claims)
}

/// Hex-encoded sha256 digest used for stored credentials.
pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
