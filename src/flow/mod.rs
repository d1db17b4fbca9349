//! Login, callback and logout flows
//!
//! Each flow works against the [`RequestContext`](crate::context::RequestContext)
//! and [`ResponseContext`](crate::context::ResponseContext) capabilities and
//! returns the location to redirect to; turning that into an HTTP response is
//! left to the handlers.

pub mod callback;
pub mod login;
pub mod logout;

pub use callback::{CallbackFlow, CallbackStage};
pub use login::LoginOptions;
pub use logout::LogoutOptions;
