//! Request and response capabilities
//!
//! The session core never touches framework types directly. It reads
//! headers and cookies through [`RequestContext`] and writes cookies and
//! headers through [`ResponseContext`]; actix-web types implement both, and
//! so do the test doubles in `testing`.

use actix_web::{
    cookie::Cookie,
    http::header::{HeaderName, HeaderValue, LOCATION},
    HttpMessage, HttpRequest, HttpResponse, HttpResponseBuilder,
};
use log::warn;

use crate::session::cache::CachedSession;

pub trait RequestContext {
    fn read_header(&self, name: &str) -> Option<String>;

    /// Every cookie on the request as `(name, value)` pairs
    fn read_cookies(&self) -> Vec<(String, String)>;

    fn read_cookie(&self, name: &str) -> Option<String> {
        self.read_cookies()
            .into_iter()
            .find(|(cookie_name, _)| cookie_name == name)
            .map(|(_, value)| value)
    }

    /// Session already resolved for this request, if any
    fn cached_session(&self) -> Option<CachedSession>;

    fn cache_session(&self, entry: CachedSession);
}

pub trait ResponseContext {
    fn set_cookie(&mut self, cookie: Cookie<'static>);

    fn set_header(&mut self, name: &str, value: &str);
}

// ============================================================================
// actix-web adapters
// ============================================================================

impl RequestContext for HttpRequest {
    fn read_header(&self, name: &str) -> Option<String> {
        self.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    }

    fn read_cookies(&self) -> Vec<(String, String)> {
        match self.cookies() {
            Ok(cookies) => cookies
                .iter()
                .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
                .collect(),
            Err(e) => {
                warn!("Failed to parse request cookies: {e}");
                Vec::new()
            }
        }
    }

    fn cached_session(&self) -> Option<CachedSession> {
        self.extensions().get::<CachedSession>().cloned()
    }

    fn cache_session(&self, entry: CachedSession) {
        self.extensions_mut().insert(entry);
    }
}

impl ResponseContext for HttpResponseBuilder {
    fn set_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookie(cookie);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.insert_header((name.to_string(), value.to_string()));
    }
}

impl<B> ResponseContext for HttpResponse<B> {
    fn set_cookie(&mut self, cookie: Cookie<'static>) {
        if let Err(e) = self.add_cookie(&cookie) {
            warn!("Failed to add cookie '{}' to response: {e}", cookie.name());
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers_mut().insert(name, value);
            }
            _ => warn!("Dropping invalid response header '{name}'"),
        }
    }
}

// ============================================================================
// Pending response
// ============================================================================

/// Cookies and headers collected by a flow before the response exists
#[derive(Debug, Default, Clone)]
pub struct PendingResponse {
    cookies: Vec<Cookie<'static>>,
    headers: Vec<(String, String)>,
}

impl PendingResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().rev().find(|cookie| cookie.name() == name)
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Finish as a 302 redirect to `location`
    #[must_use]
    pub fn redirect(self, location: &str) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        self.apply_to(&mut builder);
        builder.insert_header((LOCATION, location.to_string())).finish()
    }

    /// Copy the collected cookies and headers onto another response
    pub fn apply_to<W: ResponseContext + ?Sized>(self, target: &mut W) {
        for cookie in self.cookies {
            target.set_cookie(cookie);
        }
        for (name, value) in self.headers {
            target.set_header(&name, &value);
        }
    }
}

impl ResponseContext for PendingResponse {
    fn set_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookies.push(cookie);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test::TestRequest};

    #[test]
    fn test_http_request_reads_cookies_and_headers() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-proto", "https"))
            .cookie(Cookie::new("foo", "bar"))
            .cookie(Cookie::new("appSession", "abc"))
            .to_http_request();

        assert_eq!(req.read_header("x-forwarded-proto").as_deref(), Some("https"));
        assert_eq!(req.read_cookie("foo").as_deref(), Some("bar"));
        assert_eq!(req.read_cookie("appSession").as_deref(), Some("abc"));
        assert_eq!(req.read_cookie("missing"), None);
        assert_eq!(req.read_cookies().len(), 2);
    }

    #[test]
    fn test_pending_response_redirect() {
        let mut pending = PendingResponse::new();
        pending.set_cookie(Cookie::new("state", "s"));
        pending.set_header("cache-control", "no-store");

        assert!(pending.cookie("state").is_some());
        let response = pending.redirect("https://example.org/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("https://example.org/")
        );
        assert_eq!(
            response
                .headers()
                .get("cache-control")
                .and_then(|v| v.to_str().ok()),
            Some("no-store")
        );
        assert_eq!(response.cookies().count(), 1);
    }
}
