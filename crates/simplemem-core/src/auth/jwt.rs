//! HMAC-SHA256-signed bearer tokens carrying `{sub: user_id, exp}`
//! (spec §4.K).

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

pub fn issue(secret: &str, user_id: &str, expiration_days: i64) -> Result<String, AuthError> {
    let exp = (Utc::now() + chrono::Duration::days(expiration_days)).timestamp();
    let claims = Claims { sub: user_id.to_string(), exp };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AuthError::Crypto(e.to_string()))
}

/// Verify signature and expiry, returning the bound `user_id`.
pub fn verify(secret: &str, token: &str) -> Result<String, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?;
    Ok(data.claims.sub)
}

/// Accept a token that's either still valid or expired within the grace
/// window; reject anything further expired (spec §4.K "Refresh").
pub fn verify_for_refresh(secret: &str, token: &str, grace_hours: i64) -> Result<String, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?;

    let now = Utc::now().timestamp();
    let grace_seconds = grace_hours * 3600;
    if data.claims.exp + grace_seconds < now {
        return Err(AuthError::Expired);
    }
    Ok(data.claims.sub)
}
