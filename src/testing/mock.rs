//! Test doubles for the request/response capabilities and the OIDC client

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use actix_web::cookie::Cookie;
use actix_web::test::TestRequest;
use async_trait::async_trait;
use url::Url;

use crate::context::RequestContext;
use crate::models::TokenSet;
use crate::oauth::{CallbackChecks, CallbackParams, OAuthError, OidcClient};
use crate::session::cache::CachedSession;
use crate::session::cookie::is_removal;

use super::{TestFixtures, TEST_CLIENT_ID, TEST_ISSUER};

/// In-memory request with its own per-request session memo
#[derive(Debug, Default)]
pub struct MockRequest {
    cookies: Vec<(String, String)>,
    headers: HashMap<String, String>,
    memo: RefCell<Option<CachedSession>>,
}

impl MockRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }
}

impl RequestContext for MockRequest {
    fn read_header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    fn read_cookies(&self) -> Vec<(String, String)> {
        self.cookies.clone()
    }

    fn cached_session(&self) -> Option<CachedSession> {
        self.memo.borrow().clone()
    }

    fn cache_session(&self, entry: CachedSession) {
        *self.memo.borrow_mut() = Some(entry);
    }
}

/// Cookie store that follows Set-Cookie semantics across requests
#[derive(Debug, Clone, Default)]
pub struct BrowserJar {
    cookies: BTreeMap<String, String>,
}

impl BrowserJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    /// Apply Set-Cookie headers in order; removals delete the cookie
    pub fn apply(&mut self, cookies: &[Cookie<'_>]) {
        for cookie in cookies {
            if is_removal(cookie) {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    /// A fresh request carrying every cookie in the jar
    #[must_use]
    pub fn request(&self) -> MockRequest {
        self.cookies
            .iter()
            .fold(MockRequest::new(), |req, (name, value)| req.with_cookie(name, value))
    }

    /// Attach the jar's cookies to an actix test request
    #[must_use]
    pub fn test_request(&self, request: TestRequest) -> TestRequest {
        self.cookies.iter().fold(request, |request, (name, value)| {
            request.cookie(Cookie::new(name.clone(), value.clone()))
        })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Cookie names in sorted order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.cookies.keys().cloned().collect()
    }
}

/// Scripted identity provider; records every callback it receives
pub struct MockOidcClient {
    outcome: Result<TokenSet, OAuthError>,
    end_session_endpoint: Option<String>,
    calls: Mutex<Vec<(CallbackParams, CallbackChecks)>>,
}

impl Default for MockOidcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOidcClient {
    /// Succeeds with [`TestFixtures::token_set`]; no `end_session_endpoint`
    #[must_use]
    pub fn new() -> Self {
        Self {
            outcome: Ok(TestFixtures::token_set()),
            end_session_endpoint: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_token_set(mut self, token_set: TokenSet) -> Self {
        self.outcome = Ok(token_set);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: OAuthError) -> Self {
        self.outcome = Err(error);
        self
    }

    #[must_use]
    pub fn with_end_session_endpoint(mut self, endpoint: &str) -> Self {
        self.end_session_endpoint = Some(endpoint.to_string());
        self
    }

    /// # Panics
    ///
    /// Panics if the call log mutex is poisoned.
    #[must_use]
    pub fn last_checks(&self) -> Option<CallbackChecks> {
        let calls = self.calls.lock().expect("call log poisoned");
        calls.last().map(|(_, checks)| checks.clone())
    }

    /// # Panics
    ///
    /// Panics if the call log mutex is poisoned.
    #[must_use]
    pub fn last_params(&self) -> Option<CallbackParams> {
        let calls = self.calls.lock().expect("call log poisoned");
        calls.last().map(|(params, _)| params.clone())
    }

    /// # Panics
    ///
    /// Panics if the call log mutex is poisoned.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("call log poisoned").len()
    }
}

#[async_trait]
impl OidcClient for MockOidcClient {
    fn issuer(&self) -> &str {
        TEST_ISSUER
    }

    fn authorization_url(&self, params: &BTreeMap<String, String>) -> Result<String, OAuthError> {
        let mut url = Url::parse(&format!("{TEST_ISSUER}/authorize"))
            .map_err(|e| OAuthError::Discovery(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(params.iter());
        Ok(url.into())
    }

    async fn callback(
        &self,
        _redirect_uri: &str,
        params: &CallbackParams,
        checks: &CallbackChecks,
    ) -> Result<TokenSet, OAuthError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((params.clone(), checks.clone()));
        }
        if let Some(error) = &params.error {
            return Err(OAuthError::Provider {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }
        self.outcome.clone()
    }

    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String> {
        let mut url = Url::parse(self.end_session_endpoint.as_deref()?).ok()?;
        {
            let mut query = url.query_pairs_mut();
            match id_token_hint {
                Some(hint) => query.append_pair("id_token_hint", hint),
                None => query.append_pair("client_id", TEST_CLIENT_ID),
            };
            query.append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        }
        Some(url.into())
    }
}
