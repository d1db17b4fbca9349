use log::warn;
use url::Url;

use crate::context::{RequestContext, ResponseContext};
use crate::relying_party::RelyingParty;
use crate::settings::url_join;
use crate::utils::logging::LoggingHelper;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutOptions {
    /// Absolute URL, or a path relative to `base_url`
    pub return_to: Option<String>,
}

fn resolve_return_to(rp: &RelyingParty, options: &LogoutOptions) -> String {
    let settings = rp.settings();
    match options.return_to.as_deref() {
        Some(return_to) if return_to.contains("://") => return_to.to_string(),
        Some(return_to) if !return_to.is_empty() => url_join(&settings.base_url, return_to),
        _ => settings.post_logout_redirect(),
    }
}

/// `{issuer}/v2/logout?client_id=..&returnTo=..`
fn provider_logout_url(rp: &RelyingParty, return_to: &str) -> Option<String> {
    let settings = rp.settings();
    let mut url = Url::parse(&format!("{}/v2/logout", settings.issuer_base_url)).ok()?;
    url.query_pairs_mut()
        .append_pair("client_id", &settings.client_id)
        .append_pair("returnTo", return_to);
    Some(url.into())
}

/// Clear the session and work out where the browser goes next
pub fn logout(
    rp: &RelyingParty,
    req: &dyn RequestContext,
    res: &mut dyn ResponseContext,
    options: &LogoutOptions,
) -> String {
    let return_to = resolve_return_to(rp, options);
    let settings = rp.settings();

    let Some(session) = rp.session(req).into_session() else {
        LoggingHelper::log_logout("no session", &return_to);
        return return_to;
    };
    rp.sessions().destroy(req, res);

    if !settings.idp_logout {
        LoggingHelper::log_logout("local", &return_to);
        return return_to;
    }

    if settings.provider_logout {
        if let Some(url) = provider_logout_url(rp, &return_to) {
            LoggingHelper::log_logout("provider", &return_to);
            return url;
        }
        warn!(
            "Cannot build provider logout URL from issuer '{}', logging out locally",
            settings.issuer_base_url
        );
        return return_to;
    }

    match rp
        .client()
        .end_session_url(session.id_token.as_deref(), &return_to)
    {
        Some(url) => {
            LoggingHelper::log_logout("end_session", &return_to);
            url
        }
        None => {
            warn!(
                "Issuer {} has no end_session_endpoint, logging out locally",
                rp.client().issuer()
            );
            return_to
        }
    }
}
