// HTTP handlers and guards for the relying party routes
pub mod auth;
pub mod guards;

use actix_web::web;

use crate::settings::RouteSettings;

pub use auth::{callback_form, callback_query, login, logout, profile};
pub use guards::{
    page_guard, touch_session, AuthenticatedSession, LoginRedirect, OptionalSession, PageSession,
};

/// Mount the login, callback, logout and profile routes at their configured
/// paths. Expects a `web::Data<RelyingParty>` in the app data.
pub fn configure_routes(cfg: &mut web::ServiceConfig, routes: &RouteSettings) {
    cfg.route(&routes.login, web::get().to(login))
        .route(&routes.callback, web::get().to(callback_query))
        .route(&routes.callback, web::post().to(callback_form))
        .route(&routes.logout, web::get().to(logout))
        .route(&routes.profile, web::get().to(profile));
}
