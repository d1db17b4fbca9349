// Login, callback, logout and profile handlers
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::context::PendingResponse;
use crate::errors::AuthError;
use crate::flow::{LoginOptions, LogoutOptions};
use crate::oauth::CallbackParams;
use crate::relying_party::RelyingParty;
use crate::utils::logging::LoggingHelper;
use crate::utils::responses::ResponseBuilder;

use super::guards::AuthenticatedSession;

#[derive(Debug, Default, Deserialize)]
pub struct ReturnToQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Redirect to the identity provider
///
/// # Errors
/// Returns `AuthError::BadRequest` when the configured authorization
/// parameters are invalid
pub async fn login(
    req: HttpRequest,
    query: web::Query<ReturnToQuery>,
    rp: web::Data<RelyingParty>,
) -> Result<HttpResponse, AuthError> {
    let options = LoginOptions {
        return_to: query.into_inner().return_to,
        ..LoginOptions::default()
    };
    let mut pending = PendingResponse::new();
    let location = rp.login(&req, &mut pending, &options)?;
    Ok(pending.redirect(&location))
}

/// Callback for the `query` response mode
pub async fn callback_query(
    req: HttpRequest,
    params: web::Query<CallbackParams>,
    rp: web::Data<RelyingParty>,
) -> HttpResponse {
    complete_callback(&req, &rp, params.into_inner()).await
}

/// Callback for the `form_post` response mode
pub async fn callback_form(
    req: HttpRequest,
    params: web::Form<CallbackParams>,
    rp: web::Data<RelyingParty>,
) -> HttpResponse {
    complete_callback(&req, &rp, params.into_inner()).await
}

async fn complete_callback(
    req: &HttpRequest,
    rp: &RelyingParty,
    params: CallbackParams,
) -> HttpResponse {
    LoggingHelper::log_callback_received(
        req.method().as_str(),
        params.code.is_some(),
        params.id_token.is_some(),
    );

    let mut pending = PendingResponse::new();
    match rp.callback(req, &mut pending, params).await {
        Ok(location) => pending.redirect(&location),
        Err(e) => {
            // Consumed transient cookies are cleared on failure too
            let mut response = e.error_response();
            pending.apply_to(&mut response);
            response
        }
    }
}

pub async fn logout(
    req: HttpRequest,
    query: web::Query<ReturnToQuery>,
    rp: web::Data<RelyingParty>,
) -> HttpResponse {
    let options = LogoutOptions {
        return_to: query.into_inner().return_to,
    };
    let mut pending = PendingResponse::new();
    let location = rp.logout(&req, &mut pending, &options);
    pending.redirect(&location)
}

/// User claims of the current session
pub async fn profile(session: AuthenticatedSession) -> HttpResponse {
    ResponseBuilder::ok()
        .with_header("cache-control", "no-store")
        .json(&session.into_inner().user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::configure_routes;
    use crate::settings::RouteSettings;
    use crate::testing::{BrowserJar, TestFixtures};
    use actix_web::{
        dev::ServiceResponse,
        http::{header::LOCATION, StatusCode},
        test, App,
    };
    use url::Url;

    fn location<B>(response: &ServiceResponse<B>) -> String {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn jar_from<B>(response: &ServiceResponse<B>, jar: &mut BrowserJar) {
        let cookies: Vec<_> = response
            .response()
            .cookies()
            .map(actix_web::cookie::Cookie::into_owned)
            .collect();
        jar.apply(&cookies);
    }

    #[actix_web::test]
    async fn test_login_callback_profile_roundtrip() {
        let rp = TestFixtures::relying_party();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(rp))
                .configure(|cfg| configure_routes(cfg, &RouteSettings::default())),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/auth/login?returnTo=/profile")
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let mut jar = BrowserJar::new();
        jar_from(&response, &mut jar);
        assert!(jar.contains("code_verifier"));

        let authorize = Url::parse(&location(&response)).unwrap();
        let state = authorize
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let response = test::call_service(
            &app,
            jar.test_request(test::TestRequest::get().uri(&format!(
                "/api/auth/callback?code=abc&state={}",
                urlencoding::encode(&state)
            )))
            .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/profile");
        jar_from(&response, &mut jar);
        assert!(jar.contains("appSession"));

        let response = test::call_service(
            &app,
            jar.test_request(test::TestRequest::get().uri("/api/auth/me"))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["sub"], "user-123");
    }

    #[actix_web::test]
    async fn test_callback_without_login_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(TestFixtures::relying_party()))
                .configure(|cfg| configure_routes(cfg, &RouteSettings::default())),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/callback")
                .set_form([("code", "abc"), ("state", "unexpected")])
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.response().cookies().all(|c| c.name() != "appSession"));
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "invalid_state");
    }

    #[actix_web::test]
    async fn test_profile_requires_session() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(TestFixtures::relying_party()))
                .configure(|cfg| configure_routes(cfg, &RouteSettings::default())),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/auth/me").to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
    }

    #[actix_web::test]
    async fn test_logout_without_session() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(TestFixtures::relying_party()))
                .configure(|cfg| configure_routes(cfg, &RouteSettings::default())),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/auth/logout?returnTo=/bye")
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "https://example.org/bye");
    }
}
