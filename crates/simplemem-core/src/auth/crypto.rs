//! AEAD encryption of stored provider credentials (spec §4.K), AES-256-GCM
//! with a random 96-bit nonce per encryption, stored as `nonce || ciphertext`
//! base64-encoded alongside the user row.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;

use super::AuthError;

const NONCE_LEN: usize = 12;

pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| AuthError::Crypto(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(base64::engine::general_purpose::STANDARD.encode(combined))
}

pub fn decrypt(key: &[u8; 32], encoded: &str) -> Result<String, AuthError> {
    let combined = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(e.to_string()))?;
    if combined.len() < NONCE_LEN {
        return Err(AuthError::Crypto("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|e| AuthError::Crypto(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = [7u8; 32];
        let ct = encrypt(&key, "sk-provider-secret-key").unwrap();
        assert_ne!(ct, "sk-provider-secret-key");
        let pt = decrypt(&key, &ct).unwrap();
        assert_eq!(pt, "sk-provider-secret-key");
    }

    #[test]
    fn distinct_encryptions_use_distinct_nonces() {
        let key = [7u8; 32];
        let a = encrypt(&key, "same-plaintext").unwrap();
        let b = encrypt(&key, "same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = [1u8; 32];
        let key_b = [2u8; 32];
        let ct = encrypt(&key_a, "secret").unwrap();
        assert!(decrypt(&key_b, &ct).is_err());
    }
}
