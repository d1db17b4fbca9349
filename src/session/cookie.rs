use actix_web::cookie::{
    time::{Duration, OffsetDateTime},
    Cookie, SameSite,
};

/// Attributes shared by every cookie the relying party writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    /// `None` omits the attribute entirely
    pub same_site: Option<SameSite>,
    pub path: String,
    pub domain: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: Some(SameSite::Lax),
            path: "/".to_string(),
            domain: None,
        }
    }
}

/// How long a cookie should live in the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieLifetime {
    /// No `Expires`/`Max-Age`: dropped when the browser session ends
    Session,
    /// Expires at the given epoch second
    ExpiresAt(i64),
    /// Relative lifetime in seconds
    MaxAge(i64),
}

/// Build a cookie with the given attributes
#[must_use]
pub fn build_cookie(
    name: &str,
    value: String,
    options: &CookieOptions,
    lifetime: CookieLifetime,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_owned(), value);
    cookie.set_http_only(options.http_only);
    cookie.set_secure(options.secure);
    cookie.set_path(options.path.clone());
    if let Some(same_site) = options.same_site {
        cookie.set_same_site(same_site);
    }
    if let Some(domain) = &options.domain {
        cookie.set_domain(domain.clone());
    }

    match lifetime {
        CookieLifetime::Session => {}
        CookieLifetime::ExpiresAt(timestamp) => {
            if let Ok(expires) = OffsetDateTime::from_unix_timestamp(timestamp) {
                cookie.set_expires(expires);
            }
        }
        CookieLifetime::MaxAge(seconds) => cookie.set_max_age(Duration::seconds(seconds)),
    }

    cookie
}

/// Build a cookie that tells the browser to delete `name`.
///
/// Path and domain must match the cookie being removed.
#[must_use]
pub fn expired_cookie(name: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut cookie = build_cookie(name, String::new(), options, CookieLifetime::MaxAge(0));
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

/// Whether a Set-Cookie removes the cookie rather than setting it
#[must_use]
pub fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age().is_some_and(|max_age| max_age <= Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cookie_attributes() {
        let options = CookieOptions {
            domain: Some("example.org".to_string()),
            ..CookieOptions::default()
        };
        let cookie = build_cookie(
            "appSession",
            "value".to_string(),
            &options,
            CookieLifetime::ExpiresAt(1_700_000_000),
        );

        assert_eq!(cookie.name(), "appSession");
        assert_eq!(cookie.value(), "value");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.org"));
        assert_eq!(
            cookie.expires_datetime().map(OffsetDateTime::unix_timestamp),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_session_lifetime_has_no_expiry() {
        let cookie = build_cookie(
            "appSession",
            "v".to_string(),
            &CookieOptions::default(),
            CookieLifetime::Session,
        );
        assert!(cookie.expires().is_none());
        assert!(cookie.max_age().is_none());
    }

    #[test]
    fn test_same_site_can_be_omitted() {
        let options = CookieOptions {
            same_site: None,
            ..CookieOptions::default()
        };
        let cookie = build_cookie("_state", "v".to_string(), &options, CookieLifetime::MaxAge(60));
        assert_eq!(cookie.same_site(), None);
        assert!(!is_removal(&cookie));
    }

    #[test]
    fn test_expired_cookie() {
        let cookie = expired_cookie("appSession.1", &CookieOptions::default());
        assert_eq!(cookie.value(), "");
        assert!(is_removal(&cookie));
    }
}
