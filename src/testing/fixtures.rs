//! Pre-built settings, provider metadata, tokens and relying parties

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;

use crate::models::{Session, TokenSet};
use crate::oauth::{OidcClient, OidcDiscoveryDocument};
use crate::relying_party::RelyingParty;
use crate::session::clock::{Clock, SystemClock};
use crate::settings::RpSettings;

use super::{MockOidcClient, TEST_BASE_URL, TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_ISSUER, TEST_SECRET};

/// Central fixture provider for test data
pub struct TestFixtures;

impl TestFixtures {
    /// Valid settings for a confidential client using the code flow
    #[must_use]
    pub fn settings() -> RpSettings {
        RpSettings {
            secrets: vec![TEST_SECRET.to_string()],
            base_url: TEST_BASE_URL.to_string(),
            issuer_base_url: TEST_ISSUER.to_string(),
            client_id: TEST_CLIENT_ID.to_string(),
            client_secret: Some(TEST_CLIENT_SECRET.to_string()),
            ..RpSettings::default()
        }
    }

    #[must_use]
    pub fn discovery_document() -> OidcDiscoveryDocument {
        OidcDiscoveryDocument {
            issuer: TEST_ISSUER.to_string(),
            authorization_endpoint: format!("{TEST_ISSUER}/authorize"),
            token_endpoint: format!("{TEST_ISSUER}/oauth/token"),
            jwks_uri: format!("{TEST_ISSUER}/.well-known/jwks.json"),
            userinfo_endpoint: Some(format!("{TEST_ISSUER}/userinfo")),
            end_session_endpoint: Some(format!("{TEST_ISSUER}/session/end")),
            id_token_signing_alg_values_supported: vec!["RS256".to_string(), "HS256".to_string()],
            response_types_supported: vec![
                "code".to_string(),
                "id_token".to_string(),
                "code id_token".to_string(),
            ],
            response_modes_supported: vec!["query".to_string(), "form_post".to_string()],
        }
    }

    /// ID token claims for `user-123`, issued at `now` and valid for an hour.
    /// No `auth_time`; add one when testing `max_age`.
    #[must_use]
    pub fn id_token_claims(nonce: &str, now: i64) -> Map<String, Value> {
        let claims = json!({
            "iss": TEST_ISSUER,
            "sub": "user-123",
            "aud": TEST_CLIENT_ID,
            "iat": now,
            "exp": now + 3600,
            "nonce": nonce,
            "email": "user@example.com",
            "name": "Test User",
        });
        match claims {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Token set a code flow callback would produce
    #[must_use]
    pub fn token_set() -> TokenSet {
        let now = chrono::Utc::now().timestamp();
        let claims = Self::id_token_claims("fixture-nonce", now);
        TokenSet {
            id_token: Some(mint_hs256_id_token(&claims, TEST_CLIENT_SECRET)),
            access_token: Some("fixture-access-token".to_string()),
            refresh_token: Some("fixture-refresh-token".to_string()),
            token_type: Some("Bearer".to_string()),
            expires_at: Some(now + 3600),
            scope: Some("openid profile email".to_string()),
            claims,
        }
    }

    #[must_use]
    pub fn session() -> Session {
        Session::from_token_set(&Self::token_set(), chrono::Utc::now().timestamp())
    }

    /// Relying party backed by a default [`MockOidcClient`]
    #[must_use]
    pub fn relying_party() -> RelyingParty {
        Self::relying_party_with_client(Arc::new(MockOidcClient::new()))
    }

    #[must_use]
    pub fn relying_party_with_client(client: Arc<dyn OidcClient>) -> RelyingParty {
        Self::relying_party_from(Self::settings(), client)
    }

    /// # Panics
    ///
    /// Panics if `settings` do not validate.
    #[must_use]
    pub fn relying_party_from(settings: RpSettings, client: Arc<dyn OidcClient>) -> RelyingParty {
        Self::build(settings, client, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn relying_party_with_clock(client: Arc<dyn OidcClient>, clock: Arc<dyn Clock>) -> RelyingParty {
        Self::build(Self::settings(), client, clock)
    }

    fn build(settings: RpSettings, client: Arc<dyn OidcClient>, clock: Arc<dyn Clock>) -> RelyingParty {
        RelyingParty::new_with_clock(settings, client, clock).expect("test settings are valid")
    }
}

/// Compact HS256 JWS over `claims`, the way a provider signs with the client
/// secret
///
/// # Panics
///
/// Panics if `secret` cannot key an HMAC, which does not happen for SHA-256.
#[must_use]
pub fn mint_hs256_id_token(claims: &Map<String, Value>, secret: &str) -> String {
    let header = json!({"alg": "HS256", "typ": "JWT"});
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(Value::Object(claims.clone()).to_string())
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{signing_input}.{signature}")
}
