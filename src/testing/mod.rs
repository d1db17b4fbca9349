//! Testing utilities
//!
//! Available to unit tests and, with the `testing` feature, to the
//! integration tests under `tests/`.
//!
//! - [`fixtures`]: settings, provider metadata, token sets, relying parties
//! - [`mock`]: request/response doubles, a cookie jar and a scripted OIDC client
//!
//! ```rust,ignore
//! use oidc_rp::testing::{BrowserJar, TestFixtures};
//!
//! let rp = TestFixtures::relying_party();
//! let state = rp.session(&BrowserJar::new().request());
//! assert!(!state.is_authenticated());
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::{mint_hs256_id_token, TestFixtures};
pub use mock::{BrowserJar, MockOidcClient, MockRequest};

pub const TEST_ISSUER: &str = "https://op.example.com";
pub const TEST_BASE_URL: &str = "https://example.org";
pub const TEST_CLIENT_ID: &str = "__test_client_id__";
pub const TEST_CLIENT_SECRET: &str = "__test_client_secret__";
pub const TEST_SECRET: &str = "__test_session_secret__";
