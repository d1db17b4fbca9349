//! Relying party facade
//!
//! [`RelyingParty`] bundles the validated configuration, the key ring, the
//! session cache, the transient store and the OIDC client. It is cheap to
//! clone and is shared with every actix worker through `web::Data`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{RequestContext, ResponseContext};
use crate::errors::AuthError;
use crate::flow::callback::CallbackFlow;
use crate::flow::login::{self, LoginOptions};
use crate::flow::logout::{self, LogoutOptions};
use crate::models::{Session, SessionState};
use crate::oauth::{AuthorizationState, CallbackParams, HttpOidcClient, OidcClient};
use crate::session::cache::SessionCache;
use crate::session::clock::{Clock, SystemClock};
use crate::session::codec::SessionCodec;
use crate::session::transient::TransientStore;
use crate::settings::{ConfigError, RpSettings};
use crate::utils::crypto::KeyRing;
use crate::utils::logging::LoggingHelper;

/// Produces the application part of the login state
pub trait LoginStateHook: Send + Sync {
    /// Must return a JSON object; `returnTo` in it overrides the default
    fn login_state(&self, req: &dyn RequestContext, options: &LoginOptions) -> Value;
}

impl<F> LoginStateHook for F
where
    F: Fn(&dyn RequestContext, &LoginOptions) -> Value + Send + Sync,
{
    fn login_state(&self, req: &dyn RequestContext, options: &LoginOptions) -> Value {
        self(req, options)
    }
}

/// Runs after a successful callback; the session it returns is persisted
#[async_trait(?Send)]
pub trait AfterCallback: Send + Sync {
    async fn after_callback(
        &self,
        req: &dyn RequestContext,
        res: &mut dyn ResponseContext,
        session: Session,
        state: &AuthorizationState,
    ) -> Result<Session, AuthError>;
}

#[derive(Clone)]
pub struct RelyingParty {
    settings: Arc<RpSettings>,
    sessions: SessionCache,
    transient: TransientStore,
    client: Arc<dyn OidcClient>,
    clock: Arc<dyn Clock>,
    login_state: Option<Arc<dyn LoginStateHook>>,
    after_callback: Option<Arc<dyn AfterCallback>>,
}

impl std::fmt::Debug for RelyingParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelyingParty")
            .field("issuer", &self.client.issuer())
            .field("client_id", &self.settings.client_id)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl RelyingParty {
    /// # Errors
    ///
    /// Returns a `ConfigError` if the settings do not validate.
    pub fn new(settings: RpSettings, client: Arc<dyn OidcClient>) -> Result<Self, ConfigError> {
        Self::new_with_clock(settings, client, Arc::new(SystemClock))
    }

    /// # Errors
    ///
    /// Returns a `ConfigError` if the settings do not validate.
    pub fn new_with_clock(
        settings: RpSettings,
        client: Arc<dyn OidcClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let keys = KeyRing::from_secrets(&settings.secrets).map_err(|_| ConfigError::MissingSecret)?;

        let sessions = SessionCache::new(SessionCodec::new(&settings, keys.clone()), clock.clone());
        let transient = TransientStore::new(&settings, keys, clock.clone());
        LoggingHelper::log_configuration(&settings);

        Ok(Self {
            settings: Arc::new(settings),
            sessions,
            transient,
            client,
            clock,
            login_state: None,
            after_callback: None,
        })
    }

    /// Validate the settings, then discover the issuer over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` for invalid settings and
    /// `AuthError::Provider` when discovery fails.
    pub async fn discover(settings: RpSettings) -> Result<Self, AuthError> {
        settings.validate()?;
        let client = HttpOidcClient::discover(&settings).await?;
        Ok(Self::new(settings, Arc::new(client))?)
    }

    #[must_use]
    pub fn with_login_state_hook(mut self, hook: impl LoginStateHook + 'static) -> Self {
        self.login_state = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_after_callback(mut self, hook: impl AfterCallback + 'static) -> Self {
        self.after_callback = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn settings(&self) -> &RpSettings {
        &self.settings
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    #[must_use]
    pub fn transient(&self) -> &TransientStore {
        &self.transient
    }

    #[must_use]
    pub fn client(&self) -> &dyn OidcClient {
        self.client.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn login_state_hook(&self) -> Option<&dyn LoginStateHook> {
        self.login_state.as_deref()
    }

    pub(crate) fn after_callback_hook(&self) -> Option<&dyn AfterCallback> {
        self.after_callback.as_deref()
    }

    /// Session state for the request, decoded at most once per request
    pub fn session(&self, req: &dyn RequestContext) -> SessionState {
        self.sessions.get(req)
    }

    /// Start a login; returns the authorization URL to redirect to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadRequest` for invalid authorization parameters or
    /// login state.
    pub fn login(
        &self,
        req: &dyn RequestContext,
        res: &mut dyn ResponseContext,
        options: &LoginOptions,
    ) -> Result<String, AuthError> {
        login::login(self, req, res, options)
    }

    /// Complete a login; returns the URL to send the user back to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Protocol` when the callback does not correlate with
    /// the login or the provider rejected it, `AuthError::Provider` when the
    /// provider could not be reached.
    pub async fn callback(
        &self,
        req: &dyn RequestContext,
        res: &mut dyn ResponseContext,
        params: CallbackParams,
    ) -> Result<String, AuthError> {
        CallbackFlow::new(self).run(req, res, params).await
    }

    /// Log out; returns the URL to redirect to
    pub fn logout(
        &self,
        req: &dyn RequestContext,
        res: &mut dyn ResponseContext,
        options: &LogoutOptions,
    ) -> String {
        logout::logout(self, req, res, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockOidcClient, TestFixtures};

    #[test]
    fn test_invalid_settings_are_rejected_at_construction() {
        let mut settings = TestFixtures::settings();
        settings.secrets.clear();
        let result = RelyingParty::new(settings, Arc::new(MockOidcClient::new()));
        assert_eq!(result.err(), Some(ConfigError::MissingSecret));

        let mut settings = TestFixtures::settings();
        settings.authorization_params.scope = "profile".to_string();
        let result = RelyingParty::new(settings, Arc::new(MockOidcClient::new()));
        assert_eq!(result.err(), Some(ConfigError::MissingOpenIdScope));
    }

    #[test]
    fn test_closure_login_state_hook() {
        let rp = TestFixtures::relying_party().with_login_state_hook(
            |_: &dyn RequestContext, _: &LoginOptions| serde_json::json!({"tenant": "acme"}),
        );
        assert!(rp.login_state_hook().is_some());
        assert!(rp.after_callback_hook().is_none());
    }
}
