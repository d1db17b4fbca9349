//! Session guards
//!
//! - [`AuthenticatedSession`] rejects unauthenticated API requests with 401.
//! - [`OptionalSession`] never rejects.
//! - [`page_guard`] / [`PageSession`] send browsers to the login route.
//! - [`touch_session`] extends rolling sessions after the handler ran.

use std::future::{ready, Ready};

use actix_web::{
    dev::{Payload, ServiceResponse},
    http::{header::LOCATION, StatusCode},
    web, FromRequest, HttpRequest, HttpResponse, ResponseError,
};
use log::{debug, warn};

use crate::errors::AuthError;
use crate::models::Session;
use crate::relying_party::RelyingParty;

fn relying_party(req: &HttpRequest) -> Result<&RelyingParty, AuthError> {
    req.app_data::<web::Data<RelyingParty>>()
        .map(|data| data.get_ref())
        .ok_or_else(|| AuthError::Internal("RelyingParty is not registered as app data".to_string()))
}

/// Extracts the current session or fails with 401
#[derive(Debug, Clone)]
pub struct AuthenticatedSession(pub Session);

impl AuthenticatedSession {
    #[must_use]
    pub fn into_inner(self) -> Session {
        self.0
    }
}

impl std::ops::Deref for AuthenticatedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

impl FromRequest for AuthenticatedSession {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(relying_party(req).and_then(|rp| match rp.session(req).into_session() {
            Some(session) => Ok(Self(session)),
            None => Err(AuthError::Unauthorized),
        }))
    }
}

/// Extracts the current session if there is one
#[derive(Debug, Clone)]
pub struct OptionalSession(pub Option<Session>);

impl FromRequest for OptionalSession {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(relying_party(req).map(|rp| Self(rp.session(req).into_session())))
    }
}

/// Redirect to the login route, remembering where the browser wanted to go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub location: String,
}

impl std::fmt::Display for LoginRedirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "login required, redirecting to {}", self.location)
    }
}

impl ResponseError for LoginRedirect {
    fn status_code(&self) -> StatusCode {
        StatusCode::FOUND
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Found()
            .insert_header((LOCATION, self.location.clone()))
            .finish()
    }
}

/// Session for a browser page, or a redirect to `login?returnTo=<path>`
///
/// # Errors
///
/// Returns a [`LoginRedirect`] when the request has no valid session.
pub fn page_guard(rp: &RelyingParty, req: &HttpRequest) -> Result<Session, LoginRedirect> {
    if let Some(session) = rp.session(req).into_session() {
        return Ok(session);
    }
    let return_to = req
        .uri()
        .path_and_query()
        .map_or("/", actix_web::http::uri::PathAndQuery::as_str);
    debug!("No session for page {return_to}, redirecting to login");
    Err(LoginRedirect {
        location: format!(
            "{}?returnTo={}",
            rp.settings().routes.login,
            urlencoding::encode(return_to)
        ),
    })
}

/// [`page_guard`] as an extractor
#[derive(Debug, Clone)]
pub struct PageSession(pub Session);

impl FromRequest for PageSession {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(match relying_party(req) {
            Ok(rp) => page_guard(rp, req).map(Self).map_err(Into::into),
            Err(e) => Err(e.into()),
        })
    }
}

/// Re-issue a rolling session cookie once the handler has produced its
/// response. Used from `App::wrap_fn`.
pub fn touch_session<B>(response: &mut ServiceResponse<B>) {
    let req = response.request().clone();
    let Ok(rp) = relying_party(&req) else {
        return;
    };
    match rp.sessions().touch(&req, response.response_mut()) {
        Ok(true) => debug!("Rolling session extended"),
        Ok(false) => {}
        Err(e) => warn!("Failed to extend rolling session: {e}"),
    }
}
