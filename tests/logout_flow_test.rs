// Logout: local, provider-proprietary and RP-initiated
use std::sync::Arc;

use actix_web::{
    cookie::Cookie,
    dev::ServiceResponse,
    http::{header::LOCATION, StatusCode},
    test, web, App, HttpResponse,
};
use oidc_rp::testing::{BrowserJar, MockOidcClient, TestFixtures, TEST_CLIENT_ID};
use oidc_rp::{configure_routes, AuthenticatedSession, PendingResponse, RelyingParty};
use url::Url;

async fn protected(session: AuthenticatedSession) -> HttpResponse {
    HttpResponse::Ok().body(session.sub().unwrap_or_default().to_string())
}

macro_rules! init_app {
    ($rp:expr) => {{
        let rp: RelyingParty = $rp;
        let routes = rp.settings().routes.clone();
        test::init_service(
            App::new()
                .app_data(web::Data::new(rp))
                .configure(move |cfg| configure_routes(cfg, &routes))
                .route("/api/data", web::get().to(protected)),
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

/// Jar holding `foo=bar` and a session large enough to be chunked
fn logged_in_jar(rp: &RelyingParty) -> BrowserJar {
    let mut jar = BrowserJar::new().with_cookie("foo", "bar");
    let mut session = TestFixtures::session();
    session
        .user
        .insert("groups".to_string(), "g".repeat(6_000).into());

    let mut res = PendingResponse::new();
    rp.sessions()
        .create(&jar.request(), &mut res, session)
        .expect("session sealed");
    jar.apply(res.cookies());
    assert!(jar.contains("appSession.count"));
    jar
}

#[actix_web::test]
async fn test_local_logout_clears_only_session_cookies() {
    let mut settings = TestFixtures::settings();
    settings.idp_logout = false;
    let rp = TestFixtures::relying_party_from(settings, Arc::new(MockOidcClient::new()));
    let mut jar = logged_in_jar(&rp);
    let app = init_app!(rp);

    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri("/api/data"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri("/api/auth/logout"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://example.org");

    let cookies: Vec<Cookie<'static>> = response
        .response()
        .cookies()
        .map(Cookie::into_owned)
        .collect();
    assert!(cookies.iter().all(|c| c.name().starts_with("appSession")));
    jar.apply(&cookies);
    assert_eq!(jar.names(), vec!["foo".to_string()]);

    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri("/api/data"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_provider_logout_redirect() {
    let mut settings = TestFixtures::settings();
    settings.provider_logout = true;
    let rp = TestFixtures::relying_party_from(settings, Arc::new(MockOidcClient::new()));
    let jar = logged_in_jar(&rp);
    let app = init_app!(rp);

    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri("/api/auth/logout?returnTo=%2Fbye"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let url = Url::parse(&location(&response)).unwrap();
    assert_eq!(url.origin().ascii_serialization(), "https://op.example.com");
    assert_eq!(url.path(), "/v2/logout");
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        query,
        vec![
            ("client_id".to_string(), TEST_CLIENT_ID.to_string()),
            ("returnTo".to_string(), "https://example.org/bye".to_string()),
        ]
    );
}

#[actix_web::test]
async fn test_rp_initiated_logout_sends_id_token_hint() {
    let client = MockOidcClient::new().with_end_session_endpoint("https://op.example.com/session/end");
    let rp = TestFixtures::relying_party_with_client(Arc::new(client));
    let jar = logged_in_jar(&rp);
    let app = init_app!(rp);

    let response = test::call_service(
        &app,
        jar.test_request(test::TestRequest::get().uri("/api/auth/logout"))
            .to_request(),
    )
    .await;
    let url = Url::parse(&location(&response)).unwrap();
    assert_eq!(url.path(), "/session/end");

    let pairs: std::collections::HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert!(pairs.contains_key("id_token_hint"));
    assert_eq!(pairs["post_logout_redirect_uri"], "https://example.org");
}

#[actix_web::test]
async fn test_logout_without_session_skips_provider() {
    let mut settings = TestFixtures::settings();
    settings.provider_logout = true;
    let app = init_app!(TestFixtures::relying_party_from(
        settings,
        Arc::new(MockOidcClient::new())
    ));

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/auth/logout?returnTo=https%3A%2F%2Fother.example%2Fdone")
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://other.example/done");
    assert_eq!(response.response().cookies().count(), 0);
}
