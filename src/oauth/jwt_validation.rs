// ID token validation with JWKS discovery and caching
// Supports RS256 signatures from the issuer's JWKS and HS256 signatures keyed with the client secret

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use rsa::{pkcs1v15::VerifyingKey, RsaPublicKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Unexpected algorithm: expected {expected}, got {actual}")]
    UnexpectedAlgorithm { expected: String, actual: String },
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Failed to decode key: {0}")]
    KeyDecodingFailed(String),
    #[error("JWT signature verification failed")]
    SignatureInvalid,
    #[error("Failed to fetch JWKS: {0}")]
    JwksFetchFailed(String),
    #[error("Missing required claim '{0}'")]
    MissingClaim(&'static str),
    #[error("Claim '{claim}' validation failed: expected '{expected}', got '{actual}'")]
    ClaimValidationFailed {
        claim: &'static str,
        expected: String,
        actual: String,
    },
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token is not yet valid")]
    TokenNotYetValid,
    #[error("Too much time has elapsed since the last end-user authentication")]
    AuthTimeExceeded,
}

// ============================================================================
// JWT Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: Option<String>,
    pub kid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    // RSA modulus and exponent
    pub n: Option<String>,
    pub e: Option<String>,
}

/// What a valid ID token must say about itself
#[derive(Debug, Clone)]
pub struct IdTokenExpectations {
    pub issuer: String,
    pub client_id: String,
    pub algorithm: String,
    /// Nonce sent with the authorization request
    pub nonce: String,
    /// `max_age` sent with the authorization request, enforced against `auth_time`
    pub max_age: Option<u64>,
    pub clock_tolerance: i64,
    pub now: i64,
}

// ============================================================================
// JWKS Cache
// ============================================================================

pub struct JwksCache {
    keys: HashMap<String, JsonWebKey>,
    last_updated: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    cache_duration: Duration,
    retry_backoff: Duration,
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

impl JwksCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            last_updated: None,
            last_failure: None,
            cache_duration: Duration::from_secs(3600),
            retry_backoff: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn is_cache_valid(&self) -> bool {
        self.last_updated.is_some_and(|last_updated| {
            let elapsed = Utc::now().signed_duration_since(last_updated);
            elapsed.to_std().unwrap_or(Duration::MAX) < self.cache_duration
        })
    }

    #[must_use]
    pub fn should_retry_fetch(&self) -> bool {
        self.last_failure.map_or(true, |last_failure| {
            let elapsed = Utc::now().signed_duration_since(last_failure);
            elapsed.to_std().unwrap_or(Duration::MAX) >= self.retry_backoff
        })
    }

    /// Key for `kid`; a token without `kid` may use the only key in the set
    #[must_use]
    pub fn get_key(&self, kid: Option<&str>) -> Option<&JsonWebKey> {
        match kid {
            Some(kid) => self.keys.get(kid),
            None if self.keys.len() == 1 => self.keys.values().next(),
            None => None,
        }
    }

    pub fn store_keys(&mut self, keys: Vec<JsonWebKey>) {
        self.keys = keys
            .into_iter()
            .filter(|key| {
                key.kty == "RSA" && key.key_use.as_deref().map_or(true, |u| u == "sig")
            })
            .enumerate()
            .map(|(index, key)| {
                let kid = key.kid.clone().unwrap_or_else(|| format!("unnamed-{index}"));
                (kid, key)
            })
            .collect();
        debug!("Cached {} signing keys", self.keys.len());
        self.last_updated = Some(Utc::now());
        self.last_failure = None;
    }

    pub fn record_fetch_failure(&mut self) {
        self.last_failure = Some(Utc::now());
    }
}

// ============================================================================
// ID Token Validator
// ============================================================================

#[derive(Clone)]
pub struct IdTokenValidator {
    jwks_uri: String,
    client_secret: Option<String>,
    http: reqwest::Client,
    cache: Arc<RwLock<JwksCache>>,
}

impl std::fmt::Debug for IdTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenValidator")
            .field("jwks_uri", &self.jwks_uri)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl IdTokenValidator {
    #[must_use]
    pub fn new(jwks_uri: &str, client_secret: Option<String>, http: reqwest::Client) -> Self {
        Self {
            jwks_uri: jwks_uri.to_string(),
            client_secret,
            http,
            cache: Arc::new(RwLock::new(JwksCache::new())),
        }
    }

    /// Verify the signature and claims of an ID token, returning its claims.
    ///
    /// # Errors
    ///
    /// Returns a `JwtValidationError` if the token is malformed, signed with an
    /// unexpected algorithm or key, or its claims fail validation.
    pub async fn validate(
        &self,
        token: &str,
        expect: &IdTokenExpectations,
    ) -> Result<Map<String, Value>, JwtValidationError> {
        let (header, claims, signing_input, signature) = split_token(token)?;
        debug!("ID token header: alg={}, kid={:?}", header.alg, header.kid);

        if header.alg != expect.algorithm {
            return Err(JwtValidationError::UnexpectedAlgorithm {
                expected: expect.algorithm.clone(),
                actual: header.alg,
            });
        }

        match header.alg.as_str() {
            "RS256" => {
                let key = self.get_public_key(header.kid.as_deref()).await?;
                verify_rsa_signature(&signing_input, &signature, &key)?;
            }
            "HS256" => {
                let secret = self.client_secret.as_deref().ok_or_else(|| {
                    JwtValidationError::KeyDecodingFailed("no client secret for HS256".to_string())
                })?;
                verify_hs256_signature(&signing_input, &signature, secret)?;
            }
            alg => return Err(JwtValidationError::UnsupportedAlgorithm(alg.to_string())),
        }

        validate_claims(&claims, expect)?;
        info!(
            "ID token validated for subject {}",
            claims.get("sub").and_then(Value::as_str).unwrap_or("<unknown>")
        );
        Ok(claims)
    }

    async fn get_public_key(&self, kid: Option<&str>) -> Result<JsonWebKey, JwtValidationError> {
        let cache = self.cache.read().await;
        if cache.is_cache_valid() {
            if let Some(key) = cache.get_key(kid) {
                return Ok(key.clone());
            }
        }
        drop(cache);

        // Cache miss or stale: the issuer may have rotated its keys
        self.fetch_and_cache_jwks().await?;
        let cache = self.cache.read().await;
        cache
            .get_key(kid)
            .cloned()
            .ok_or_else(|| JwtValidationError::KeyNotFound(kid.unwrap_or("<none>").to_string()))
    }

    async fn fetch_and_cache_jwks(&self) -> Result<(), JwtValidationError> {
        if !self.cache.read().await.should_retry_fetch() {
            return Err(JwtValidationError::JwksFetchFailed(
                "Skipping fetch due to recent failure".to_string(),
            ));
        }

        debug!("Fetching JWKS from {}", self.jwks_uri);
        match self.fetch_jwks().await {
            Ok(jwks) => {
                self.cache.write().await.store_keys(jwks.keys);
                Ok(())
            }
            Err(e) => {
                warn!("JWKS fetch failed: {e}");
                self.cache.write().await.record_fetch_failure();
                Err(e)
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<JsonWebKeySet, JwtValidationError> {
        let response = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| JwtValidationError::JwksFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwtValidationError::JwksFetchFailed(format!(
                "JWKS request failed with status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| JwtValidationError::JwksFetchFailed(format!("Failed to parse JWKS: {e}")))
    }
}

// ============================================================================
// Token parsing and signatures
// ============================================================================

type SplitToken = (JwtHeader, Map<String, Value>, String, Vec<u8>);

fn split_token(token: &str) -> Result<SplitToken, JwtValidationError> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtValidationError::InvalidToken(
            "Invalid JWT format".to_string(),
        ));
    };

    let signature_bytes = URL_SAFE_NO_PAD.decode(signature).map_err(|e| {
        JwtValidationError::InvalidToken(format!("Invalid signature encoding: {e}"))
    })?;

    Ok((
        decode_segment(header, "header")?,
        decode_segment(claims, "claims")?,
        format!("{header}.{claims}"),
        signature_bytes,
    ))
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        JwtValidationError::InvalidToken(format!("Invalid {what} encoding: {e}"))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid {what} JSON: {e}")))
}

/// Verify an RS256 signature with a JWK
///
/// # Errors
///
/// Returns `KeyDecodingFailed` for an unusable key and `SignatureInvalid`
/// when the signature does not verify.
pub fn verify_rsa_signature(
    signing_input: &str,
    signature: &[u8],
    public_key: &JsonWebKey,
) -> Result<(), JwtValidationError> {
    use rsa::signature::Verifier;

    let n = public_key.n.as_ref().ok_or_else(|| {
        JwtValidationError::KeyDecodingFailed("Missing RSA modulus (n)".to_string())
    })?;
    let e = public_key.e.as_ref().ok_or_else(|| {
        JwtValidationError::KeyDecodingFailed("Missing RSA exponent (e)".to_string())
    })?;
    let n_bytes = URL_SAFE_NO_PAD.decode(n).map_err(|e| {
        JwtValidationError::KeyDecodingFailed(format!("Invalid modulus encoding: {e}"))
    })?;
    let e_bytes = URL_SAFE_NO_PAD.decode(e).map_err(|e| {
        JwtValidationError::KeyDecodingFailed(format!("Invalid exponent encoding: {e}"))
    })?;

    let rsa_key = RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n_bytes),
        rsa::BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| JwtValidationError::KeyDecodingFailed(format!("Invalid RSA key: {e}")))?;

    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)?;
    VerifyingKey::<Sha256>::new(rsa_key)
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)
}

/// Verify an HS256 signature keyed with the client secret
///
/// # Errors
///
/// Returns `SignatureInvalid` when the MAC does not match.
pub fn verify_hs256_signature(
    signing_input: &str,
    signature: &[u8],
    secret: &str,
) -> Result<(), JwtValidationError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| JwtValidationError::KeyDecodingFailed(e.to_string()))?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)
}

// ============================================================================
// Claims
// ============================================================================

/// Check issuer, audience, timing, nonce and `auth_time` claims
///
/// # Errors
///
/// Returns the first claim that fails validation.
pub fn validate_claims(
    claims: &Map<String, Value>,
    expect: &IdTokenExpectations,
) -> Result<(), JwtValidationError> {
    validate_issuer(claims, &expect.issuer)?;
    validate_audience(claims, &expect.client_id)?;
    validate_timing(claims, expect.now, expect.clock_tolerance)?;

    if claims.get("sub").and_then(Value::as_str).is_none() {
        return Err(JwtValidationError::MissingClaim("sub"));
    }

    let nonce = claims.get("nonce").and_then(Value::as_str);
    if nonce != Some(expect.nonce.as_str()) {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "nonce",
            expected: expect.nonce.clone(),
            actual: nonce.unwrap_or_default().to_string(),
        });
    }

    if let Some(max_age) = expect.max_age {
        let auth_time = claims
            .get("auth_time")
            .and_then(Value::as_i64)
            .ok_or(JwtValidationError::MissingClaim("auth_time"))?;
        let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
        if expect.now - expect.clock_tolerance > auth_time.saturating_add(max_age) {
            return Err(JwtValidationError::AuthTimeExceeded);
        }
    }

    Ok(())
}

fn validate_issuer(claims: &Map<String, Value>, expected: &str) -> Result<(), JwtValidationError> {
    let issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .ok_or(JwtValidationError::MissingClaim("iss"))?;
    if issuer.trim_end_matches('/') != expected.trim_end_matches('/') {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "iss",
            expected: expected.to_string(),
            actual: issuer.to_string(),
        });
    }
    Ok(())
}

fn validate_audience(claims: &Map<String, Value>, client_id: &str) -> Result<(), JwtValidationError> {
    let aud = claims
        .get("aud")
        .ok_or(JwtValidationError::MissingClaim("aud"))?;
    let audiences = extract_audiences(aud);
    if !audiences.iter().any(|aud| aud == client_id) {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "aud",
            expected: client_id.to_string(),
            actual: format!("{audiences:?}"),
        });
    }

    match claims.get("azp").and_then(Value::as_str) {
        Some(azp) if azp != client_id => Err(JwtValidationError::ClaimValidationFailed {
            claim: "azp",
            expected: client_id.to_string(),
            actual: azp.to_string(),
        }),
        None if audiences.len() > 1 => Err(JwtValidationError::MissingClaim("azp")),
        _ => Ok(()),
    }
}

fn validate_timing(
    claims: &Map<String, Value>,
    now: i64,
    tolerance: i64,
) -> Result<(), JwtValidationError> {
    let exp = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or(JwtValidationError::MissingClaim("exp"))?;
    if now > exp.saturating_add(tolerance) {
        return Err(JwtValidationError::TokenExpired);
    }

    let iat = claims
        .get("iat")
        .and_then(Value::as_i64)
        .ok_or(JwtValidationError::MissingClaim("iat"))?;
    if iat > now.saturating_add(tolerance) {
        return Err(JwtValidationError::TokenNotYetValid);
    }

    if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
        if now < nbf.saturating_sub(tolerance) {
            return Err(JwtValidationError::TokenNotYetValid);
        }
    }
    Ok(())
}

/// Hybrid flow: `c_hash` must be the left half of SHA-256 over the returned
/// code, base64url encoded
///
/// # Errors
///
/// Returns `MissingClaim("c_hash")` or a `ClaimValidationFailed` mismatch.
pub fn validate_code_hash(claims: &Map<String, Value>, code: &str) -> Result<(), JwtValidationError> {
    use sha2::Digest;

    let c_hash = claims
        .get("c_hash")
        .and_then(Value::as_str)
        .ok_or(JwtValidationError::MissingClaim("c_hash"))?;
    let digest = Sha256::digest(code.as_bytes());
    let expected = URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]);
    if c_hash != expected {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "c_hash",
            expected,
            actual: c_hash.to_string(),
        });
    }
    Ok(())
}

/// `aud` may be a single string or an array of strings
#[must_use]
pub fn extract_audiences(aud: &Value) -> Vec<String> {
    match aud {
        Value::String(aud) => vec![aud.clone()],
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
