// Callback: state correlation, provider errors and session creation
use std::sync::Arc;

use actix_web::{
    cookie::Cookie,
    dev::ServiceResponse,
    http::{header::LOCATION, StatusCode},
    test, web, App,
};
use oidc_rp::configure_routes;
use oidc_rp::oauth::OAuthError;
use oidc_rp::testing::{BrowserJar, MockOidcClient, TestFixtures};
use oidc_rp::RelyingParty;
use serde_json::Value;
use url::Url;

macro_rules! init_app {
    ($rp:expr) => {{
        let rp: RelyingParty = $rp;
        let routes = rp.settings().routes.clone();
        test::init_service(
            App::new()
                .app_data(web::Data::new(rp))
                .configure(move |cfg| configure_routes(cfg, &routes)),
        )
        .await
    }};
}

fn location<B>(response: &ServiceResponse<B>) -> String {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn store_cookies<B>(response: &ServiceResponse<B>, jar: &mut BrowserJar) {
    let cookies: Vec<Cookie<'static>> = response
        .response()
        .cookies()
        .map(Cookie::into_owned)
        .collect();
    jar.apply(&cookies);
}

fn state_param(authorize_url: &str) -> String {
    Url::parse(authorize_url)
        .expect("authorization URL")
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter")
}

#[actix_web::test]
async fn test_code_flow_creates_session_and_redirects() {
    let client = Arc::new(MockOidcClient::new());
    let app = init_app!(TestFixtures::relying_party_with_client(client.clone()));
    let mut jar = BrowserJar::new().with_cookie("foo", "bar");

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/auth/login?returnTo=%2Fprofile")
            .to_request(),
    )
    .await;
    store_cookies(&response, &mut jar);
    let state = state_param(&location(&response));

    let callback_uri = format!(
        "/api/auth/callback?code=authorization-code&state={}",
        urlencoding::encode(&state)
    );
    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri(&callback_uri))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/profile");
    store_cookies(&response, &mut jar);

    assert!(jar.contains("appSession"));
    assert!(jar.contains("foo"));
    for name in ["state", "nonce", "code_verifier"] {
        assert!(!jar.contains(name), "{name} should be consumed");
    }

    let params = client.last_params().unwrap();
    assert_eq!(params.code.as_deref(), Some("authorization-code"));
    assert!(client.last_checks().unwrap().code_verifier.is_some());

    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri("/api/auth/me"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let user: Value = test::read_body_json(response).await;
    assert_eq!(user["sub"], "user-123");
    assert_eq!(user["email"], "user@example.com");
    assert!(user.get("nonce").is_none());
    assert!(user.get("aud").is_none());
}

#[actix_web::test]
async fn test_form_post_callback() {
    let mut settings = TestFixtures::settings();
    settings.authorization_params.response_type = "id_token".to_string();
    let app = init_app!(TestFixtures::relying_party_from(
        settings,
        Arc::new(MockOidcClient::new())
    ));
    let mut jar = BrowserJar::new();

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/api/auth/login").to_request())
            .await;
    store_cookies(&response, &mut jar);
    let state = state_param(&location(&response));

    // Browsers drop SameSite=None cookies on insecure contexts; the legacy
    // twin alone must be enough
    jar.remove("state");
    jar.remove("nonce");

    let id_token = TestFixtures::token_set().id_token.unwrap();
    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::post().uri("/api/auth/callback"))
            .set_form([("id_token", id_token.as_str()), ("state", state.as_str())])
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://example.org");
    store_cookies(&response, &mut jar);
    assert!(jar.contains("appSession"));
    assert!(!jar.contains("_state"));
}

#[actix_web::test]
async fn test_state_mismatch_is_rejected_without_session() {
    let client = Arc::new(MockOidcClient::new());
    let app = init_app!(TestFixtures::relying_party_with_client(client.clone()));
    let mut jar = BrowserJar::new();

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/api/auth/login").to_request())
            .await;
    store_cookies(&response, &mut jar);

    let response = test::call_service(
        &app,
        jar.test_request(
            test::TestRequest::get().uri("/api/auth/callback?code=abc&state=tampered"),
        )
        .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    store_cookies(&response, &mut jar);
    assert!(!jar.contains("appSession"));
    assert!(!jar.contains("state"));
    assert_eq!(client.call_count(), 0);

    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "invalid_state");
}

#[actix_web::test]
async fn test_provider_error_detail_is_returned() {
    let app = init_app!(TestFixtures::relying_party());
    let mut jar = BrowserJar::new();

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/api/auth/login").to_request())
            .await;
    store_cookies(&response, &mut jar);
    let state = state_param(&location(&response));

    let uri = format!(
        "/api/auth/callback?error=access_denied&error_description=user%20cancelled&state={}",
        urlencoding::encode(&state)
    );
    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri(&uri))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "access_denied");
    assert_eq!(body["error_description"], "user cancelled");
}

#[actix_web::test]
async fn test_provider_timeout_is_gateway_timeout() {
    let client = MockOidcClient::new().with_error(OAuthError::Timeout);
    let app = init_app!(TestFixtures::relying_party_with_client(Arc::new(client)));
    let mut jar = BrowserJar::new();

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/api/auth/login").to_request())
            .await;
    store_cookies(&response, &mut jar);
    let state = state_param(&location(&response));

    let uri = format!(
        "/api/auth/callback?code=abc&state={}",
        urlencoding::encode(&state)
    );
    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri(&uri))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    store_cookies(&response, &mut jar);
    assert!(!jar.contains("appSession"));
}
