//! reqwest-backed OpenID Connect client
//!
//! Handles discovery, authorization URL construction, the authorization code
//! exchange (with PKCE and client authentication) and ID token validation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::models::TokenSet;
use crate::oauth::discovery::{fetch_discovery_document, OidcDiscoveryDocument};
use crate::oauth::jwt_validation::{
    validate_code_hash, IdTokenExpectations, IdTokenValidator, JwtValidationError,
};
use crate::oauth::{CallbackChecks, CallbackParams, OAuthError, OidcClient};
use crate::session::clock::{Clock, SystemClock};
use crate::settings::{effective_response_mode, ClientAuthMethod, RpSettings};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

pub struct HttpOidcClient {
    metadata: OidcDiscoveryDocument,
    client_id: String,
    client_secret: Option<String>,
    auth_method: ClientAuthMethod,
    signing_alg: String,
    clock_tolerance: i64,
    http: reqwest::Client,
    validator: IdTokenValidator,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HttpOidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOidcClient")
            .field("issuer", &self.metadata.issuer)
            .field("client_id", &self.client_id)
            .field("auth_method", &self.auth_method)
            .field("signing_alg", &self.signing_alg)
            .finish_non_exhaustive()
    }
}

impl HttpOidcClient {
    /// Fetch the issuer's discovery document and build a client from it.
    ///
    /// # Errors
    ///
    /// Returns an `OAuthError` if the document cannot be fetched or the issuer
    /// does not support the configured algorithm, response type or mode.
    pub async fn discover(settings: &RpSettings) -> Result<Self, OAuthError> {
        let http = build_http_client(settings)?;
        info!("Discovering issuer {}", settings.issuer_base_url);
        let metadata = fetch_discovery_document(&http, &settings.issuer_base_url).await?;
        Self::with_http(settings, metadata, http)
    }

    /// Build a client from an already known discovery document.
    ///
    /// # Errors
    ///
    /// Returns an `OAuthError` if the issuer does not support the configured
    /// algorithm, response type or mode, or the HTTP client cannot be built.
    pub fn from_metadata(
        settings: &RpSettings,
        metadata: OidcDiscoveryDocument,
    ) -> Result<Self, OAuthError> {
        let http = build_http_client(settings)?;
        Self::with_http(settings, metadata, http)
    }

    fn with_http(
        settings: &RpSettings,
        metadata: OidcDiscoveryDocument,
        http: reqwest::Client,
    ) -> Result<Self, OAuthError> {
        let params = &settings.authorization_params;
        metadata.check_support(
            &settings.id_token_signing_alg,
            &params.response_type,
            effective_response_mode(&params.response_type, params.response_mode.as_deref()),
        )?;

        let validator = IdTokenValidator::new(
            &metadata.jwks_uri,
            settings.client_secret.clone(),
            http.clone(),
        );
        Ok(Self {
            metadata,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            auth_method: settings.client_auth_method,
            signing_alg: settings.id_token_signing_alg.clone(),
            clock_tolerance: i64::try_from(settings.clock_tolerance).unwrap_or(i64::MAX),
            http,
            validator,
            clock: Arc::new(SystemClock),
        })
    }

    #[must_use]
    pub fn metadata(&self) -> &OidcDiscoveryDocument {
        &self.metadata
    }

    fn expectations(&self, checks: &CallbackChecks) -> Result<IdTokenExpectations, OAuthError> {
        let nonce = checks
            .nonce
            .clone()
            .ok_or(OAuthError::MissingParameter("nonce"))?;
        Ok(IdTokenExpectations {
            issuer: self.metadata.issuer.clone(),
            client_id: self.client_id.clone(),
            algorithm: self.signing_alg.clone(),
            nonce,
            max_age: checks.max_age,
            clock_tolerance: self.clock_tolerance,
            now: self.clock.now(),
        })
    }

    async fn exchange_code(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let mut request = self.http.post(&self.metadata.token_endpoint);
        match (&self.client_secret, self.auth_method) {
            (Some(secret), ClientAuthMethod::ClientSecretBasic) => {
                // RFC 6749 2.3.1: credentials are form-encoded before Basic encoding
                request = request.basic_auth(
                    urlencoding::encode(&self.client_id),
                    Some(urlencoding::encode(secret)),
                );
            }
            (Some(secret), ClientAuthMethod::ClientSecretPost) => {
                form.push(("client_id", self.client_id.as_str()));
                form.push(("client_secret", secret.as_str()));
            }
            (None, _) => form.push(("client_id", self.client_id.as_str())),
        }

        debug!("Exchanging authorization code at {}", self.metadata.token_endpoint);
        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::from_reqwest(&e))?;

        if !status.is_success() {
            return Err(token_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| OAuthError::TokenExchange(format!("invalid token response: {e}")))
    }
}

#[async_trait]
impl OidcClient for HttpOidcClient {
    fn issuer(&self) -> &str {
        &self.metadata.issuer
    }

    fn authorization_url(&self, params: &BTreeMap<String, String>) -> Result<String, OAuthError> {
        let mut url = Url::parse(&self.metadata.authorization_endpoint)
            .map_err(|e| OAuthError::Discovery(format!("invalid authorization_endpoint: {e}")))?;
        url.query_pairs_mut().extend_pairs(params.iter());
        Ok(url.into())
    }

    async fn callback(
        &self,
        redirect_uri: &str,
        params: &CallbackParams,
        checks: &CallbackChecks,
    ) -> Result<TokenSet, OAuthError> {
        if let Some(error) = &params.error {
            return Err(OAuthError::Provider {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        if params.code.is_none() && params.id_token.is_none() {
            return Err(OAuthError::MissingParameter("code"));
        }
        let expect = self.expectations(checks)?;

        // Front-channel ID token (implicit and hybrid flows)
        let mut claims: Option<Map<String, Value>> = None;
        if let Some(id_token) = &params.id_token {
            let front = self.validator.validate(id_token, &expect).await?;
            if let Some(code) = &params.code {
                validate_code_hash(&front, code)?;
            }
            claims = Some(front);
        }

        let Some(code) = &params.code else {
            let id_token = params
                .id_token
                .clone()
                .ok_or(OAuthError::MissingParameter("code"))?;
            return Ok(TokenSet {
                id_token: Some(id_token),
                claims: claims.unwrap_or_default(),
                ..TokenSet::default()
            });
        };

        let tokens = self
            .exchange_code(redirect_uri, code, checks.code_verifier.as_deref())
            .await?;

        let id_token = match tokens.id_token {
            Some(id_token) => {
                let exchanged = self.validator.validate(&id_token, &expect).await?;
                if let Some(front) = &claims {
                    if front.get("sub") != exchanged.get("sub") {
                        return Err(OAuthError::IdToken(
                            JwtValidationError::ClaimValidationFailed {
                                claim: "sub",
                                expected: claim_text(front.get("sub")),
                                actual: claim_text(exchanged.get("sub")),
                            },
                        ));
                    }
                }
                claims = Some(exchanged);
                id_token
            }
            None => params
                .id_token
                .clone()
                .ok_or(OAuthError::MissingParameter("id_token"))?,
        };

        Ok(TokenSet {
            id_token: Some(id_token),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_at: tokens
                .expires_in
                .map(|expires_in| self.clock.now() + expires_in),
            scope: tokens.scope,
            claims: claims.unwrap_or_default(),
        })
    }

    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String> {
        let endpoint = self.metadata.end_session_endpoint.as_deref()?;
        let mut url = Url::parse(endpoint).ok()?;
        {
            let mut query = url.query_pairs_mut();
            match id_token_hint {
                Some(hint) => query.append_pair("id_token_hint", hint),
                None => query.append_pair("client_id", &self.client_id),
            };
            query.append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        }
        Some(url.into())
    }
}

/// Error for a non-success token endpoint answer. Client errors without an
/// RFC 6749 error body still count as the provider rejecting the grant.
fn token_error(status: StatusCode, body: &str) -> OAuthError {
    if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(body) {
        return OAuthError::Provider {
            error: error.error,
            description: error.error_description,
        };
    }
    let description = Some(format!("token endpoint returned {status}"));
    match status {
        StatusCode::UNAUTHORIZED => OAuthError::Provider {
            error: "invalid_client".to_string(),
            description,
        },
        s if s.is_client_error() => OAuthError::Provider {
            error: "invalid_grant".to_string(),
            description,
        },
        _ => OAuthError::TokenExchange(format!("token endpoint returned {status}")),
    }
}

fn claim_text(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// reqwest client honouring the configured timeout and telemetry header
///
/// # Errors
///
/// Returns `OAuthError::Http` if the TLS backend cannot be initialised.
pub fn build_http_client(settings: &RpSettings) -> Result<reqwest::Client, OAuthError> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_millis(settings.http_timeout_ms));
    if settings.enable_telemetry {
        builder = builder.user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
    }
    builder.build().map_err(|e| OAuthError::from_reqwest(&e))
}
