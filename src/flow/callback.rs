//! Callback state machine
//!
//! ```text
//! AwaitingCallback -> ParamsValidated -> TokensExchanged -> SessionBuilt -> Redirected
//!        \________________\__________________\_______________\________-> Failed
//! ```
//!
//! The session cookie is only written once the session is built; any earlier
//! failure leaves the request's session untouched. Transient cookies are
//! consumed on entry whatever the outcome.

use log::debug;
use serde_json::Value;

use crate::context::{RequestContext, ResponseContext};
use crate::errors::AuthError;
use crate::models::TokenSet;
use crate::oauth::{decode_state, CallbackChecks, CallbackParams, JwtValidationError, OAuthError};
use crate::relying_party::RelyingParty;
use crate::session::transient::{CODE_VERIFIER, MAX_AGE, NONCE, STATE};
use crate::utils::logging::LoggingHelper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    AwaitingCallback,
    ParamsValidated,
    TokensExchanged,
    SessionBuilt,
    Redirected,
    Failed,
}

pub struct CallbackFlow<'a> {
    rp: &'a RelyingParty,
    stage: CallbackStage,
}

impl<'a> CallbackFlow<'a> {
    #[must_use]
    pub fn new(rp: &'a RelyingParty) -> Self {
        Self {
            rp,
            stage: CallbackStage::AwaitingCallback,
        }
    }

    #[must_use]
    pub fn stage(&self) -> CallbackStage {
        self.stage
    }

    /// Drive the callback to completion; returns the redirect location.
    ///
    /// # Errors
    ///
    /// Any step's error, after the stage has moved to `Failed`.
    pub async fn run(
        &mut self,
        req: &dyn RequestContext,
        res: &mut dyn ResponseContext,
        params: CallbackParams,
    ) -> Result<String, AuthError> {
        match self.advance(req, res, params).await {
            Ok(location) => {
                self.stage = CallbackStage::Redirected;
                Ok(location)
            }
            Err(e) => {
                debug!("Callback failed after stage {:?}", self.stage);
                self.stage = CallbackStage::Failed;
                LoggingHelper::log_callback_failed(&e.to_string());
                Err(e)
            }
        }
    }

    async fn advance(
        &mut self,
        req: &dyn RequestContext,
        res: &mut dyn ResponseContext,
        params: CallbackParams,
    ) -> Result<String, AuthError> {
        let checks = self.consume_checks(req, res);

        let Some(returned_state) = params.state.as_deref() else {
            return Err(OAuthError::MissingParameter("state").into());
        };
        if checks.state.as_deref() != Some(returned_state) {
            return Err(OAuthError::StateMismatch.into());
        }
        // Every login writes a nonce; without it no ID token can be bound to this browser
        if checks.nonce.is_none() {
            return Err(OAuthError::MissingParameter("nonce").into());
        }
        self.stage = CallbackStage::ParamsValidated;

        let redirect_uri = self.rp.settings().redirect_uri();
        let token_set = self
            .rp
            .client()
            .callback(&redirect_uri, &params, &checks)
            .await?;
        LoggingHelper::log_token_set(&token_set);
        self.check_organization(&token_set)?;
        self.stage = CallbackStage::TokensExchanged;

        let state = decode_state(returned_state)
            .ok_or_else(|| AuthError::BadRequest("state could not be decoded".to_string()))?;
        let mut session = self.rp.sessions().from_token_set(&token_set);
        if let Some(hook) = self.rp.after_callback_hook() {
            session = hook.after_callback(req, res, session, &state).await?;
        }
        self.stage = CallbackStage::SessionBuilt;

        self.rp.sessions().create(req, res, session)?;
        Ok(state
            .return_to
            .unwrap_or_else(|| self.rp.settings().base_url.clone()))
    }

    /// With an organization configured, the ID token must carry a matching `org_id`
    fn check_organization(&self, token_set: &TokenSet) -> Result<(), AuthError> {
        let Some(expected) = &self.rp.settings().organization else {
            return Ok(());
        };
        let actual = token_set.claims.get("org_id").and_then(Value::as_str);
        if actual == Some(expected.as_str()) {
            return Ok(());
        }
        Err(OAuthError::IdToken(JwtValidationError::ClaimValidationFailed {
            claim: "org_id",
            expected: expected.clone(),
            actual: actual.unwrap_or_default().to_string(),
        })
        .into())
    }

    /// Read (and clear) every transient value the login wrote
    fn consume_checks(&self, req: &dyn RequestContext, res: &mut dyn ResponseContext) -> CallbackChecks {
        let transient = self.rp.transient();
        CallbackChecks {
            state: transient.read(req, res, STATE),
            nonce: transient.read(req, res, NONCE),
            max_age: transient
                .read(req, res, MAX_AGE)
                .and_then(|value| value.parse().ok()),
            code_verifier: transient.read(req, res, CODE_VERIFIER),
        }
    }
}
