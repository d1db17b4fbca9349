// Centralized log lines for the authentication flows
// Tokens and secrets are never logged, only their presence
use log::{debug, info, warn};

use crate::models::TokenSet;
use crate::settings::RpSettings;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log the relying party configuration at startup
    pub fn log_configuration(settings: &RpSettings) {
        info!("🔧 Relying party for issuer {}", settings.issuer_base_url);
        info!(
            "   client_id={}, response_type={}, scope={}",
            settings.client_id,
            settings.authorization_params.response_type,
            settings.authorization_params.scope
        );
        info!(
            "   session cookie '{}' (rolling={}, rolling_duration={}s, absolute_duration={:?})",
            settings.session.name,
            settings.session.rolling,
            settings.session.rolling_duration,
            settings.session.absolute_duration
        );
        info!(
            "   {} session secret(s), idp_logout={}, provider_logout={}",
            settings.secrets.len(),
            settings.idp_logout,
            settings.provider_logout
        );
    }

    pub fn log_login_redirect(response_type: &str, response_mode: &str, return_to: Option<&str>) {
        info!(
            "🔍 Redirecting to identity provider (response_type={response_type}, response_mode={response_mode}, returnTo={})",
            return_to.unwrap_or("<default>")
        );
    }

    pub fn log_callback_received(method: &str, has_code: bool, has_id_token: bool) {
        debug!("Callback received via {method}: code={has_code}, id_token={has_id_token}");
    }

    pub fn log_token_set(token_set: &TokenSet) {
        info!(
            "🔄 Token set received: id_token={}, access_token={}, refresh_token={}, token_type={:?}, scope={:?}",
            presence(token_set.id_token.as_ref()),
            presence(token_set.access_token.as_ref()),
            presence(token_set.refresh_token.as_ref()),
            token_set.token_type,
            token_set.scope
        );
    }

    pub fn log_callback_failed(reason: &str) {
        warn!("❌ Callback rejected: {reason}");
    }

    pub fn log_logout(kind: &str, return_to: &str) {
        info!("👋 Logout ({kind}), returning to {return_to}");
    }
}

fn presence<T>(value: Option<&T>) -> &'static str {
    if value.is_some() {
        "present"
    } else {
        "missing"
    }
}
