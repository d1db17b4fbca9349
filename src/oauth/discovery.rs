use log::{debug, warn};
use serde::Deserialize;

use crate::oauth::OAuthError;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

// ============================================================================
// OIDC Discovery Document
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub response_modes_supported: Vec<String>,
}

impl OidcDiscoveryDocument {
    /// Reject configurations the issuer has declared it cannot serve
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Discovery` naming the unsupported value.
    pub fn check_support(
        &self,
        signing_alg: &str,
        response_type: &str,
        response_mode: &str,
    ) -> Result<(), OAuthError> {
        let algs = &self.id_token_signing_alg_values_supported;
        if !algs.is_empty() && !algs.iter().any(|alg| alg == signing_alg) {
            return Err(OAuthError::Discovery(format!(
                "ID token algorithm \"{signing_alg}\" is not supported by the issuer. \
                 Supported ID token algorithms are: {algs:?}."
            )));
        }

        let types = &self.response_types_supported;
        if !types.is_empty() && !types.iter().any(|t| same_response_type(t, response_type)) {
            return Err(OAuthError::Discovery(format!(
                "Response type \"{response_type}\" is not supported by the issuer. \
                 Supported response types are: {types:?}."
            )));
        }

        let modes = &self.response_modes_supported;
        if !modes.is_empty() && !modes.iter().any(|mode| mode == response_mode) {
            return Err(OAuthError::Discovery(format!(
                "Response mode \"{response_mode}\" is not supported by the issuer. \
                 Supported response modes are: {modes:?}."
            )));
        }
        Ok(())
    }
}

/// Response types compare as unordered sets of space-separated values
fn same_response_type(a: &str, b: &str) -> bool {
    let mut a: Vec<&str> = a.split_whitespace().collect();
    let mut b: Vec<&str> = b.split_whitespace().collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// Discovery URL for an issuer; a URL that already names the document is used as is
#[must_use]
pub fn discovery_url(issuer_base_url: &str) -> String {
    if issuer_base_url.contains("/.well-known/") {
        issuer_base_url.to_string()
    } else {
        format!("{}{WELL_KNOWN_PATH}", issuer_base_url.trim_end_matches('/'))
    }
}

/// Fetch and parse the issuer's discovery document
///
/// # Errors
///
/// Returns `OAuthError::Timeout`/`Http` when the request fails and
/// `OAuthError::Discovery` for a non-success status or unparsable body.
pub async fn fetch_discovery_document(
    http: &reqwest::Client,
    issuer_base_url: &str,
) -> Result<OidcDiscoveryDocument, OAuthError> {
    let url = discovery_url(issuer_base_url);
    debug!("Fetching discovery document from: {url}");

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| OAuthError::from_reqwest(&e))?;

    if !response.status().is_success() {
        return Err(OAuthError::Discovery(format!(
            "Discovery document request failed with status: {}",
            response.status()
        )));
    }

    let document: OidcDiscoveryDocument = response.json().await.map_err(|e| {
        OAuthError::Discovery(format!("Failed to parse discovery document JSON: {e}"))
    })?;

    if document.issuer.trim_end_matches('/') != issuer_base_url.trim_end_matches('/')
        && !url.starts_with(&document.issuer)
    {
        warn!(
            "Discovery document issuer '{}' differs from configured issuer '{issuer_base_url}'",
            document.issuer
        );
    }
    debug!("Discovery document fetched, JWKS URI: {}", document.jwks_uri);
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;

    #[test]
    fn test_discovery_url() {
        assert_eq!(
            discovery_url("https://op.example.com/"),
            "https://op.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            discovery_url("https://op.example.com/.well-known/openid-configuration"),
            "https://op.example.com/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_check_support() {
        let document = TestFixtures::discovery_document();
        assert!(document.check_support("RS256", "code", "query").is_ok());
        assert!(document.check_support("RS256", "id_token code", "form_post").is_ok());

        let error = document.check_support("ES512", "code", "query").unwrap_err();
        assert!(error.to_string().contains("ID token algorithm \"ES512\""));
        assert!(document.check_support("RS256", "token", "query").is_err());
        assert!(document.check_support("RS256", "code", "fragment").is_err());
    }

    #[test]
    fn test_empty_lists_accept_everything() {
        let mut document = TestFixtures::discovery_document();
        document.id_token_signing_alg_values_supported.clear();
        document.response_types_supported.clear();
        document.response_modes_supported.clear();
        assert!(document.check_support("HS256", "id_token", "form_post").is_ok());
    }
}
