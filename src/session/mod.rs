//! Session Management Module
//!
//! Everything the relying party keeps in the browser between requests.
//!
//! # Modules
//!
//! - [`chunk`] - Splitting oversized values across several cookies
//! - [`codec`] - Session ⇄ encrypted cookie envelope
//! - [`cache`] - Per-request memoized session access, rolling renewal
//! - [`transient`] - Signed single-use cookies for the login handshake
//! - [`cookie`] - Cookie construction helpers
//! - [`clock`] - Time source abstraction

pub mod cache;
pub mod chunk;
pub mod clock;
pub mod codec;
pub mod cookie;
pub mod transient;

pub use cache::{CachedSession, SessionCache};
pub use chunk::{ChunkError, CookieChunkSet};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use codec::{EnvelopeStamp, SessionCodec, MAX_COOKIE_SIZE};
pub use cookie::{CookieLifetime, CookieOptions};
pub use transient::TransientStore;
