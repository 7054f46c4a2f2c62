//! Registration, token issuance/verification, and provider-credential
//! encryption (spec §4.K).

mod crypto;
mod jwt;

use std::sync::Arc;

use uuid::Uuid;

use crate::storage::MetadataStore;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or malformed token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),
}

/// Constructed exactly once per request, immediately after verification,
/// and threaded explicitly into every engine call — never read from
/// ambient/thread-local state (spec §9 "Global state").
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub user_id: String,
    pub embedding_dim: usize,
}

pub struct AuthService {
    metadata: Arc<MetadataStore>,
    jwt_secret: String,
    encryption_key: [u8; 32],
    jwt_expiration_days: i64,
    jwt_refresh_grace_hours: i64,
}

impl AuthService {
    pub fn new(
        metadata: Arc<MetadataStore>,
        jwt_secret: String,
        encryption_key: [u8; 32],
        jwt_expiration_days: i64,
        jwt_refresh_grace_hours: i64,
    ) -> Self {
        Self { metadata, jwt_secret, encryption_key, jwt_expiration_days, jwt_refresh_grace_hours }
    }

    /// Encrypt the provider key, mint a `user_id`, issue a bearer token
    /// (spec §4.K "Registration").
    pub fn register(&self, provider_api_key: &str, embedding_dim: usize) -> Result<(String, String), AuthError> {
        let user_id = Uuid::new_v4().to_string();
        let ciphertext = crypto::encrypt(&self.encryption_key, provider_api_key)?;
        self.metadata.create_user(&user_id, &ciphertext, embedding_dim)?;
        let token = jwt::issue(&self.jwt_secret, &user_id, self.jwt_expiration_days)?;
        Ok((user_id, token))
    }

    /// Validate the token and construct the tenant's context (spec §4.K
    /// "Verification" + "Isolation").
    pub fn verify(&self, token: &str) -> Result<TenantContext, AuthError> {
        let user_id = jwt::verify(&self.jwt_secret, token)?;
        let embedding_dim = self.metadata.user_embedding_dim(&user_id)?;
        Ok(TenantContext { user_id, embedding_dim })
    }

    pub fn refresh(&self, token: &str) -> Result<String, AuthError> {
        let user_id = jwt::verify_for_refresh(&self.jwt_secret, token, self.jwt_refresh_grace_hours)?;
        if !self.metadata.user_exists(&user_id)? {
            return Err(AuthError::InvalidToken);
        }
        jwt::issue(&self.jwt_secret, &user_id, self.jwt_expiration_days)
    }

    /// Decrypt a tenant's stored provider key, for gateway construction.
    pub fn provider_api_key(&self, user_id: &str) -> Result<String, AuthError> {
        let ciphertext = self.metadata.user_encrypted_key(user_id)?;
        crypto::decrypt(&self.encryption_key, &ciphertext)
    }
}
