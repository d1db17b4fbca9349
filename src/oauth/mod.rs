//! OpenID Connect client module
//!
//! The relying party talks to the identity provider only through the
//! [`OidcClient`] trait. [`HttpOidcClient`] is the reqwest-backed default;
//! tests substitute `testing::MockOidcClient`.

pub mod client;
pub mod discovery;
pub mod jwt_validation;
pub mod state;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::TokenSet;

pub use client::HttpOidcClient;
pub use discovery::OidcDiscoveryDocument;
pub use jwt_validation::{IdTokenExpectations, IdTokenValidator, JwtValidationError};
pub use state::{decode_state, encode_state, AuthorizationState};

/// Parameters the provider sends back to the callback route, from the query
/// string (GET) or the form body (POST)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub id_token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Values remembered from the login redirect that the callback must honour
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackChecks {
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub max_age: Option<u64>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("{error}{}", .description.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Provider {
        error: String,
        description: Option<String>,
    },
    #[error("state mismatch")]
    StateMismatch,
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid ID token: {0}")]
    IdToken(#[from] JwtValidationError),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("request to the identity provider timed out")]
    Timeout,
}

impl OAuthError {
    pub(crate) fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.to_string())
        }
    }

    /// The request or the provider's answer was unacceptable, as opposed to
    /// the provider being unreachable. A failed code exchange counts as a
    /// rejection; only transport failures and discovery are not.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. }
                | Self::StateMismatch
                | Self::MissingParameter(_)
                | Self::IdToken(_)
                | Self::TokenExchange(_)
        )
    }
}

#[async_trait]
pub trait OidcClient: Send + Sync {
    fn issuer(&self) -> &str;

    /// Authorization endpoint URL carrying `params` as its query
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Discovery` if the endpoint is not a valid URL.
    fn authorization_url(&self, params: &BTreeMap<String, String>) -> Result<String, OAuthError>;

    /// Validate the callback parameters, exchange any authorization code and
    /// validate the resulting ID token
    async fn callback(
        &self,
        redirect_uri: &str,
        params: &CallbackParams,
        checks: &CallbackChecks,
    ) -> Result<TokenSet, OAuthError>;

    /// RP-initiated logout URL, or `None` when the issuer has no
    /// `end_session_endpoint`
    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let error = OAuthError::Provider {
            error: "access_denied".to_string(),
            description: Some("user cancelled".to_string()),
        };
        assert_eq!(error.to_string(), "access_denied (user cancelled)");

        let error = OAuthError::Provider {
            error: "login_required".to_string(),
            description: None,
        };
        assert_eq!(error.to_string(), "login_required");
    }

    #[test]
    fn test_protocol_error_classification() {
        assert!(OAuthError::StateMismatch.is_protocol_error());
        assert!(OAuthError::IdToken(JwtValidationError::TokenExpired).is_protocol_error());
        assert!(OAuthError::TokenExchange("invalid token response".to_string()).is_protocol_error());
        assert!(!OAuthError::Timeout.is_protocol_error());
        assert!(!OAuthError::Http("connection refused".to_string()).is_protocol_error());
    }
}
