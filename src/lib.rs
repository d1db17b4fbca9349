#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the oidc-rp crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod context;
pub mod errors;
pub mod flow;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod relying_party;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use context::{PendingResponse, RequestContext, ResponseContext};
pub use errors::AuthError;
pub use flow::{LoginOptions, LogoutOptions};
pub use handlers::{configure_routes, AuthenticatedSession, OptionalSession, PageSession};
pub use models::{Session, SessionState, TokenSet, UnauthenticatedReason};
pub use oauth::{HttpOidcClient, OidcClient};
pub use relying_party::{AfterCallback, LoginStateHook, RelyingParty};
pub use settings::RpSettings;
