use std::collections::BTreeMap;

use actix_web::cookie::SameSite;

use crate::context::{RequestContext, ResponseContext};
use crate::errors::AuthError;
use crate::oauth::{encode_state, AuthorizationState};
use crate::relying_party::RelyingParty;
use crate::session::transient::{CODE_VERIFIER, MAX_AGE, NONCE, STATE};
use crate::settings::{
    effective_response_mode, validate_response_mode, validate_response_type, validate_scope,
};
use crate::utils::crypto::{code_challenge_s256, generate_code_verifier, generate_nonce};
use crate::utils::logging::LoggingHelper;

const STATE_SALT_BYTES: usize = 16;
const NONCE_BYTES: usize = 32;

/// Per-call login options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// Where to send the user after the callback; defaults to `base_url`
    pub return_to: Option<String>,
    /// Overrides for the configured authorization parameters
    pub authorization_params: BTreeMap<String, String>,
}

impl LoginOptions {
    #[must_use]
    pub fn returning_to(return_to: impl Into<String>) -> Self {
        Self {
            return_to: Some(return_to.into()),
            ..Self::default()
        }
    }
}

/// Configured authorization parameters with the per-call overrides on top
fn merged_params(rp: &RelyingParty, options: &LoginOptions) -> BTreeMap<String, String> {
    let settings = rp.settings();
    let configured = &settings.authorization_params;
    let mut params = BTreeMap::new();

    params.insert("response_type".to_string(), configured.response_type.clone());
    params.insert("scope".to_string(), configured.scope.clone());
    if let Some(mode) = &configured.response_mode {
        params.insert("response_mode".to_string(), mode.clone());
    }
    if let Some(audience) = &configured.audience {
        params.insert("audience".to_string(), audience.clone());
    }
    if let Some(max_age) = configured.max_age {
        params.insert("max_age".to_string(), max_age.to_string());
    }
    if let Some(organization) = &settings.organization {
        params.insert("organization".to_string(), organization.clone());
    }
    params.extend(configured.extra.clone());
    params.extend(options.authorization_params.clone());
    params
}

/// Returns the response type and the effective response mode
fn validate_params(params: &mut BTreeMap<String, String>) -> Result<(String, String), AuthError> {
    let response_type = params.get("response_type").cloned().unwrap_or_default();
    let scope = params.get("scope").map_or("", String::as_str);

    validate_scope(scope).map_err(|e| AuthError::BadRequest(e.to_string()))?;
    validate_response_type(&response_type).map_err(|e| AuthError::BadRequest(e.to_string()))?;

    let mode = effective_response_mode(&response_type, params.get("response_mode").map(String::as_str))
        .to_string();
    validate_response_mode(&response_type, &mode).map_err(|e| AuthError::BadRequest(e.to_string()))?;
    params.insert("response_mode".to_string(), mode.clone());

    if let Some(max_age) = params.get("max_age") {
        if max_age.parse::<u64>().is_err() {
            return Err(AuthError::BadRequest(
                "max_age must be a whole number of seconds".to_string(),
            ));
        }
    }
    Ok((response_type, mode))
}

/// Prepare the authorization redirect and write the transient cookies the
/// callback will need.
///
/// # Errors
///
/// Returns `AuthError::BadRequest` for invalid parameters or login state, and
/// `AuthError::Session` if a transient value cannot be signed.
pub fn login(
    rp: &RelyingParty,
    req: &dyn RequestContext,
    res: &mut dyn ResponseContext,
    options: &LoginOptions,
) -> Result<String, AuthError> {
    let settings = rp.settings();
    let mut params = merged_params(rp, options);
    let (response_type, response_mode) = validate_params(&mut params)?;
    let same_site = if response_mode == "form_post" {
        SameSite::None
    } else {
        settings.session.cookie.same_site.into()
    };

    let state_value = match rp.login_state_hook() {
        Some(hook) => hook.login_state(req, options),
        None => serde_json::json!({
            "returnTo": options.return_to.clone().unwrap_or_else(|| settings.base_url.clone()),
        }),
    };
    let mut state = AuthorizationState::from_value(state_value, generate_nonce(STATE_SALT_BYTES))?;
    if state.return_to.is_none() {
        state.return_to = options.return_to.clone();
    }
    let encoded_state = encode_state(&state);
    let nonce = generate_nonce(NONCE_BYTES);

    let transient = rp.transient();
    transient.save(res, STATE, &encoded_state, same_site)?;
    transient.save(res, NONCE, &nonce, same_site)?;
    if let Some(max_age) = params.get("max_age") {
        transient.save(res, MAX_AGE, max_age, same_site)?;
    }
    if response_type.contains("code") {
        let verifier = generate_code_verifier();
        transient.save(res, CODE_VERIFIER, &verifier, same_site)?;
        params.insert("code_challenge".to_string(), code_challenge_s256(&verifier));
        params.insert("code_challenge_method".to_string(), "S256".to_string());
    }

    params.insert("client_id".to_string(), settings.client_id.clone());
    params.insert("redirect_uri".to_string(), settings.redirect_uri());
    params.insert("state".to_string(), encoded_state);
    params.insert("nonce".to_string(), nonce);

    LoggingHelper::log_login_redirect(&response_type, &response_mode, state.return_to.as_deref());
    Ok(rp.client().authorization_url(&params)?)
}
