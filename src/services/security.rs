use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{AppError, Result};

/// Length of an onboarding token string
pub const ONBOARDING_TOKEN_LEN: usize = 16;

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Opaque session secret stored against a principal (64 hex chars)
pub fn generate_session_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Session identifier, distinct from the secret
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// URL-safe onboarding token; 12 random bytes encode to exactly 16 characters
pub fn generate_onboarding_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 12]>())
}
