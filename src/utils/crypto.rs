// Cryptographic primitives for session envelopes, signed transient cookies and PKCE

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// GCM authentication tag size
pub const TAG_SIZE: usize = 16;

const ENCRYPTION_INFO: &[u8] = b"JWE CEK";
const SIGNING_INFO: &[u8] = b"JWS Cookie Signing Key";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key ring contains no secrets")]
    EmptyKeyRing,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("encryption failed")]
    Encryption,
    #[error("malformed envelope")]
    MalformedEnvelope,
    #[error("no key in the ring could decrypt the envelope")]
    NoMatchingKey,
}

// ============================================================================
// Key ring
// ============================================================================

#[derive(Clone)]
struct DerivedKey {
    encryption: [u8; ENCRYPTION_KEY_SIZE],
    signing: [u8; ENCRYPTION_KEY_SIZE],
}

/// Ordered set of keys derived from the configured secrets.
///
/// The first key encrypts and signs; every key is tried, in order, when
/// decrypting or verifying. Rotating a secret means prepending the new one
/// and keeping the old one around until outstanding cookies expire.
#[derive(Clone)]
pub struct KeyRing {
    keys: Arc<[DerivedKey]>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl KeyRing {
    /// Derive encryption and signing keys for every secret with HKDF-SHA256.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EmptyKeyRing` when no secret is supplied.
    pub fn from_secrets<S: AsRef<str>>(secrets: &[S]) -> Result<Self, CryptoError> {
        if secrets.is_empty() {
            return Err(CryptoError::EmptyKeyRing);
        }

        let keys = secrets
            .iter()
            .map(|secret| {
                let hk = Hkdf::<Sha256>::new(None, secret.as_ref().as_bytes());
                let mut encryption = [0u8; ENCRYPTION_KEY_SIZE];
                let mut signing = [0u8; ENCRYPTION_KEY_SIZE];
                hk.expand(ENCRYPTION_INFO, &mut encryption)
                    .map_err(|_| CryptoError::KeyDerivation)?;
                hk.expand(SIGNING_INFO, &mut signing)
                    .map_err(|_| CryptoError::KeyDerivation)?;
                Ok(DerivedKey {
                    encryption,
                    signing,
                })
            })
            .collect::<Result<Vec<_>, CryptoError>>()?;

        Ok(Self { keys: keys.into() })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn primary(&self) -> Result<&DerivedKey, CryptoError> {
        self.keys.first().ok_or(CryptoError::EmptyKeyRing)
    }
}

// ============================================================================
// Authenticated encryption
// ============================================================================

/// Encrypt bytes with the primary key.
///
/// The envelope is `base64url(nonce ‖ ciphertext ‖ tag)` with a fresh random
/// 96-bit nonce per call.
///
/// # Errors
///
/// Returns an error if the ring is empty or AES encryption fails.
pub fn encrypt(plaintext: &[u8], keys: &KeyRing) -> Result<String, CryptoError> {
    let key = keys.primary()?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.encryption));
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Decrypt an envelope produced by [`encrypt`], trying each key in order.
///
/// # Errors
///
/// Returns `MalformedEnvelope` for bad encoding or a truncated payload and
/// `NoMatchingKey` when no key authenticates the ciphertext.
pub fn decrypt(envelope: &str, keys: &KeyRing) -> Result<Vec<u8>, CryptoError> {
    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(envelope)
        .map_err(|_| CryptoError::MalformedEnvelope)?;

    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::MalformedEnvelope);
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    keys.keys
        .iter()
        .find_map(|key| {
            Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.encryption))
                .decrypt(nonce, ciphertext)
                .ok()
        })
        .ok_or(CryptoError::NoMatchingKey)
}

/// Serialize to JSON and encrypt.
///
/// # Errors
///
/// Returns an error if serialization or encryption fails.
pub fn encrypt_data<T: Serialize>(data: &T, keys: &KeyRing) -> Result<String, CryptoError> {
    let json_data =
        serde_json::to_vec(data).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    encrypt(&json_data, keys)
}

// ============================================================================
// Cookie signing
// ============================================================================

fn cookie_mac(signing_key: &[u8], name: &str, value: &str) -> Result<HmacSha256, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(signing_key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    mac.update(name.as_bytes());
    mac.update(b"=");
    mac.update(value.as_bytes());
    Ok(mac)
}

/// Sign `name=value` with the primary signing key, returning base64url HMAC-SHA256.
///
/// # Errors
///
/// Returns an error if the ring is empty.
pub fn sign_cookie(name: &str, value: &str, keys: &KeyRing) -> Result<String, CryptoError> {
    let key = keys.primary()?;
    let signature = cookie_mac(&key.signing, name, value)?.finalize().into_bytes();
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(signature))
}

/// Verify a cookie signature against every key in the ring in constant time.
#[must_use]
pub fn verify_cookie(name: &str, value: &str, signature: &str, keys: &KeyRing) -> bool {
    let Ok(signature) = general_purpose::URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };

    keys.keys
        .iter()
        .any(|key| {
            cookie_mac(&key.signing, name, value)
                .is_ok_and(|mac| mac.verify_slice(&signature).is_ok())
        })
}

// ============================================================================
// Random values and PKCE
// ============================================================================

/// Generate a cryptographically secure nonce of specified byte length
///
/// # Returns
///
/// A base64url-encoded string of `length` random bytes
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// PKCE code verifier: 32 random bytes, 43 base64url characters.
#[must_use]
pub fn generate_code_verifier() -> String {
    generate_nonce(32)
}

/// S256 code challenge: `base64url(sha256(verifier))`.
#[must_use]
pub fn code_challenge_s256(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(secrets: &[&str]) -> KeyRing {
        KeyRing::from_secrets(secrets).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let keys = ring(&["a-long-enough-secret"]);
        let envelope = encrypt(b"hello session", &keys).unwrap();
        assert_eq!(decrypt(&envelope, &keys).unwrap(), b"hello session");
    }

    #[test]
    fn test_envelope_uses_fresh_nonce() {
        let keys = ring(&["a-long-enough-secret"]);
        let first = encrypt(b"same", &keys).unwrap();
        let second = encrypt(b"same", &keys).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let envelope = encrypt(b"payload", &ring(&["first-secret-value"])).unwrap();
        let result = decrypt(&envelope, &ring(&["other-secret-value"]));
        assert_eq!(result, Err(CryptoError::NoMatchingKey));
    }

    #[test]
    fn test_key_rotation_tries_every_key() {
        let envelope = encrypt(b"payload", &ring(&["key-one-secret", "key-two-secret"])).unwrap();
        let rotated = ring(&["key-two-secret", "key-one-secret"]);
        assert_eq!(decrypt(&envelope, &rotated).unwrap(), b"payload");
    }

    #[test]
    fn test_tampered_envelope_is_rejected() {
        let keys = ring(&["a-long-enough-secret"]);
        let envelope = encrypt(b"payload", &keys).unwrap();
        let mut bytes = general_purpose::URL_SAFE_NO_PAD.decode(&envelope).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        assert_eq!(decrypt(&tampered, &keys), Err(CryptoError::NoMatchingKey));
    }

    #[test]
    fn test_malformed_envelopes() {
        let keys = ring(&["a-long-enough-secret"]);
        assert_eq!(decrypt("not base64 !!", &keys), Err(CryptoError::MalformedEnvelope));
        assert_eq!(decrypt("AAAA", &keys), Err(CryptoError::MalformedEnvelope));
    }

    #[test]
    fn test_empty_key_ring() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            KeyRing::from_secrets(&empty),
            Err(CryptoError::EmptyKeyRing)
        ));
    }

    #[test]
    fn test_encrypt_data_json() {
        let keys = ring(&["a-long-enough-secret"]);
        let value = serde_json::json!({"sub": "user-1", "n": 3});
        let envelope = encrypt_data(&value, &keys).unwrap();
        let decoded: serde_json::Value =
            serde_json::from_slice(&decrypt(&envelope, &keys).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_cookie_signature() {
        let keys = ring(&["a-long-enough-secret"]);
        let signature = sign_cookie("state", "abc", &keys).unwrap();
        assert!(verify_cookie("state", "abc", &signature, &keys));
        assert!(!verify_cookie("state", "abd", &signature, &keys));
        assert!(!verify_cookie("nonce", "abc", &signature, &keys));
        assert!(!verify_cookie("state", "abc", "bogus", &keys));
    }

    #[test]
    fn test_cookie_signature_after_rotation() {
        let old = ring(&["old-signing-secret"]);
        let signature = sign_cookie("nonce", "xyz", &old).unwrap();
        let rotated = ring(&["new-signing-secret", "old-signing-secret"]);
        assert!(verify_cookie("nonce", "xyz", &signature, &rotated));
    }

    #[test]
    fn test_pkce_challenge_known_vector() {
        // RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge_s256(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_values_are_url_safe() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 43);
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(generate_nonce(16), generate_nonce(16));
    }
}
