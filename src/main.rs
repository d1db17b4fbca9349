#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{dev::Service, middleware::Logger, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use oidc_rp::{
    handlers::{configure_routes, touch_session},
    AuthenticatedSession, OptionalSession, PageSession, RelyingParty, RpSettings,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also initializes the logger
    let settings = RpSettings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;

    let rp = RelyingParty::discover(settings.clone())
        .await
        .context("Failed to initialise the relying party")?;

    start_server(rp, &settings).await
}

/// Start the demo server
///
/// # Errors
///
/// Returns an error if the server fails to bind or start
async fn start_server(rp: RelyingParty, settings: &RpSettings) -> anyhow::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    let cors_origins = settings.get_cors_origins();
    let routes = settings.routes.clone();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let routes = routes.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(rp.clone()))
            .wrap_fn(|req, srv| {
                let fut = srv.call(req);
                async move {
                    let mut response = fut.await?;
                    touch_session(&mut response);
                    Ok(response)
                }
            })
            .wrap(cors)
            .wrap(Logger::default())
            .configure(move |cfg| configure_routes(cfg, &routes))
            .route("/", web::get().to(home))
            .route("/api/data", web::get().to(api_data))
            .route("/dashboard", web::get().to(dashboard))
            .route("/ping", web::get().to(health))
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("Server error")
}

async fn home(session: OptionalSession) -> HttpResponse {
    let greeting = match session.0.as_ref().and_then(|s| s.sub()) {
        Some(sub) => format!("Logged in as {sub}"),
        None => "Not logged in".to_string(),
    };
    HttpResponse::Ok().content_type("text/plain").body(greeting)
}

async fn api_data(session: AuthenticatedSession) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "sub": session.sub() }))
}

async fn dashboard(session: PageSession) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(format!("Dashboard for {}", session.0.sub().unwrap_or("unknown")))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

fn print_startup_info(bind_address: &str, settings: &RpSettings) {
    println!("🚀 Starting oidc-rp {} on {bind_address}", oidc_rp::VERSION);
    println!("   Issuer: {}", settings.issuer_base_url);
    println!("   Base URL: {}", settings.base_url);
    println!(
        "   Routes: login={}, callback={}, logout={}, profile={}",
        settings.routes.login, settings.routes.callback, settings.routes.logout, settings.routes.profile
    );
}
