use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::oauth::OAuthError;
use crate::settings::ConfigError;
use crate::utils::crypto::CryptoError;
use crate::utils::responses::ResponseBuilder;

/// Errors surfaced by the login, callback, logout and guard handlers
#[derive(Debug, Error)]
pub enum AuthError {
    /// The request itself is unacceptable
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication required")]
    Unauthorized,
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The callback did not correlate with the login, or the provider rejected it
    #[error(transparent)]
    Protocol(OAuthError),
    /// The identity provider could not be reached or answered nonsense
    #[error(transparent)]
    Provider(OAuthError),
    #[error("session could not be sealed: {0}")]
    Session(#[from] CryptoError),
    #[error("{0}")]
    Internal(String),
}

impl From<OAuthError> for AuthError {
    fn from(error: OAuthError) -> Self {
        if error.is_protocol_error() {
            Self::Protocol(error)
        } else {
            Self::Provider(error)
        }
    }
}

impl AuthError {
    fn error_code(&self) -> &str {
        match self {
            Self::BadRequest(_) => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::Protocol(OAuthError::Provider { error, .. }) => error.as_str(),
            Self::Protocol(OAuthError::StateMismatch) => "invalid_state",
            Self::Protocol(OAuthError::IdToken(_)) => "invalid_token",
            Self::Protocol(_) => "invalid_request",
            Self::Provider(OAuthError::Timeout) => "gateway_timeout",
            Self::Provider(_) => "bad_gateway",
            Self::Config(_) | Self::Session(_) | Self::Internal(_) => "server_error",
        }
    }

    fn description(&self) -> Option<String> {
        match self {
            Self::Protocol(OAuthError::Provider { description, .. }) => description.clone(),
            Self::BadRequest(_) | Self::Protocol(_) | Self::Provider(_) => Some(self.to_string()),
            Self::Unauthorized | Self::Config(_) | Self::Session(_) | Self::Internal(_) => None,
        }
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Provider(OAuthError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internal details stay in the logs
            return ResponseBuilder::error(status).build();
        }

        let mut builder = ResponseBuilder::error(status).with_error_code(self.error_code());
        if let Some(description) = self.description() {
            builder = builder.with_description(&description);
        }
        builder.build()
    }
}
