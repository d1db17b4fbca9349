use std::collections::BTreeMap;
use std::fs;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Values that turn a boolean environment variable off
pub const FALSEY: &[&str] = &["n", "no", "false", "0", "off"];

/// Response types the relying party knows how to complete
pub const SUPPORTED_RESPONSE_TYPES: &[&str] = &["id_token", "code id_token", "code"];

/// Claims stripped from the ID token before they are stored in the session
pub const DEFAULT_CLAIM_FILTER: &[&str] = &[
    "aud", "iss", "iat", "exp", "nbf", "nonce", "azp", "auth_time", "s_hash", "at_hash", "c_hash",
];

const DEFAULT_ABSOLUTE_DURATION: u64 = 7 * 24 * 60 * 60;
const MIN_SECRET_LENGTH: usize = 8;

static SESSION_NAME_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new("^[0-9a-zA-Z_]+$"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one session secret is required")]
    MissingSecret,
    #[error("session secrets must be at least 8 characters")]
    WeakSecret,
    #[error("\"{0}\" is required")]
    MissingField(&'static str),
    #[error("\"{field}\" must be a valid http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("\"client_secret\" is required for {0}")]
    MissingClientSecret(&'static str),
    #[error("response_type should be one of id_token, code id_token, code")]
    InvalidResponseType,
    #[error("response_mode \"{0}\" is not supported for this response_type")]
    InvalidResponseMode(String),
    #[error("scope should contain \"openid\"")]
    MissingOpenIdScope,
    #[error("unsupported id_token_signing_alg \"{0}\"")]
    UnsupportedSigningAlg(String),
    #[error("session name must only contain letters, numbers and underscores")]
    InvalidSessionName,
    #[error("absolute_duration must be set when rolling sessions are disabled")]
    MissingAbsoluteDuration,
    #[error("rolling_duration must be greater than zero")]
    InvalidRollingDuration,
}

// ============================================================================
// Settings structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpSettings {
    /// Ordered secrets; the first encrypts, the rest are accepted for decryption
    pub secrets: Vec<String>,
    pub base_url: String,
    pub issuer_base_url: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub client_auth_method: ClientAuthMethod,
    /// Seconds of clock skew accepted when validating ID tokens
    pub clock_tolerance: u64,
    pub http_timeout_ms: u64,
    pub enable_telemetry: bool,
    pub idp_logout: bool,
    /// Use the provider's `/v2/logout` endpoint instead of `end_session_endpoint`
    pub provider_logout: bool,
    pub id_token_signing_alg: String,
    pub legacy_same_site_cookie: bool,
    /// Sent as the `organization` authorization parameter; the callback then
    /// requires a matching `org_id` claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub identity_claim_filter: Vec<String>,
    pub authorization_params: AuthorizationParams,
    pub session: SessionSettings,
    pub routes: RouteSettings,
    pub application: ApplicationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    #[default]
    ClientSecretBasic,
    ClientSecretPost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationParams {
    pub response_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    /// Additional parameters forwarded verbatim to the authorization endpoint
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub name: String,
    pub rolling: bool,
    /// Seconds of inactivity after which a rolling session expires
    pub rolling_duration: u64,
    /// Seconds after login after which the session expires regardless of activity.
    /// Accepts a number, or `false` to disable.
    #[serde(
        deserialize_with = "deserialize_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub absolute_duration: Option<u64>,
    pub cookie: SessionCookieSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCookieSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub path: String,
    /// Omit `Expires` so the cookie dies with the browser session
    pub transient: bool,
    pub http_only: bool,
    /// Defaults to `true` when `base_url` is https
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    pub same_site: SameSitePolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    #[default]
    Lax,
    Strict,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub login: String,
    pub logout: String,
    pub callback: String,
    pub profile: String,
    /// Where to send the browser after logout; empty means `base_url`
    pub post_logout_redirect: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u64),
    Flag(bool),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match DurationValue::deserialize(deserializer)? {
        DurationValue::Seconds(0) | DurationValue::Flag(false) => None,
        DurationValue::Seconds(seconds) => Some(seconds),
        DurationValue::Flag(true) => Some(DEFAULT_ABSOLUTE_DURATION),
    })
}

// ============================================================================
// Defaults
// ============================================================================

impl Default for RpSettings {
    fn default() -> Self {
        Self {
            secrets: Vec::new(),
            base_url: String::new(),
            issuer_base_url: String::new(),
            client_id: String::new(),
            client_secret: None,
            client_auth_method: ClientAuthMethod::ClientSecretBasic,
            clock_tolerance: 60,
            http_timeout_ms: 5000,
            enable_telemetry: true,
            idp_logout: true,
            provider_logout: false,
            id_token_signing_alg: "RS256".to_string(),
            legacy_same_site_cookie: true,
            organization: None,
            identity_claim_filter: DEFAULT_CLAIM_FILTER
                .iter()
                .map(ToString::to_string)
                .collect(),
            authorization_params: AuthorizationParams::default(),
            session: SessionSettings::default(),
            routes: RouteSettings::default(),
            application: ApplicationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for AuthorizationParams {
    fn default() -> Self {
        Self {
            response_type: "code".to_string(),
            response_mode: None,
            scope: "openid profile email".to_string(),
            audience: None,
            max_age: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: "appSession".to_string(),
            rolling: true,
            rolling_duration: 24 * 60 * 60,
            absolute_duration: Some(DEFAULT_ABSOLUTE_DURATION),
            cookie: SessionCookieSettings::default(),
        }
    }
}

impl Default for SessionCookieSettings {
    fn default() -> Self {
        Self {
            domain: None,
            path: "/".to_string(),
            transient: false,
            http_only: true,
            secure: None,
            same_site: SameSitePolicy::Lax,
        }
    }
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".to_string(),
            logout: "/api/auth/logout".to_string(),
            callback: "/api/auth/callback".to_string(),
            profile: "/api/auth/me".to_string(),
            post_logout_redirect: String::new(),
        }
    }
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl From<SameSitePolicy> for actix_web::cookie::SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Lax => Self::Lax,
            SameSitePolicy::Strict => Self::Strict,
            SameSitePolicy::None => Self::None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl RpSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. `OIDC_*` environment variables
    /// 2. Settings.toml in `OIDC_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// The result is not validated; [`RpSettings::validate`] runs when the
    /// relying party is constructed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.normalize();
        Self::initialize_logging(&settings.logging);
        Ok(settings)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(toml_content: &str) -> Result<Self, basic_toml::Error> {
        let mut settings: Self = basic_toml::from_str(toml_content)?;
        settings.normalize();
        Ok(settings)
    }

    fn initialize_logging(logging: &LoggingSettings) {
        let env = env_logger::Env::default().default_filter_or(logging.level.as_str());
        // A logger installed by the host application takes precedence
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("OIDC_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ OIDC_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply `OIDC_*` environment variable overrides
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_client_env_overrides(settings);
        Self::apply_authorization_env_overrides(&mut settings.authorization_params);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_route_env_overrides(&mut settings.routes);
        Self::apply_application_env_overrides(&mut settings.application);
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_client_env_overrides(settings: &mut Self) {
        if let Ok(secret) = std::env::var("OIDC_SECRET") {
            let secrets: Vec<String> = secret
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
            if !secrets.is_empty() {
                settings.secrets = secrets;
            }
        }
        Self::apply_string_env_override("OIDC_BASE_URL", &mut settings.base_url);
        Self::apply_string_env_override("OIDC_ISSUER_BASE_URL", &mut settings.issuer_base_url);
        Self::apply_string_env_override("OIDC_CLIENT_ID", &mut settings.client_id);
        if let Ok(client_secret) = std::env::var("OIDC_CLIENT_SECRET") {
            settings.client_secret = Some(client_secret);
        }
        if let Ok(method) = std::env::var("OIDC_CLIENT_AUTH_METHOD") {
            match method.as_str() {
                "client_secret_basic" => {
                    settings.client_auth_method = ClientAuthMethod::ClientSecretBasic;
                }
                "client_secret_post" => {
                    settings.client_auth_method = ClientAuthMethod::ClientSecretPost;
                }
                other => log::warn!("Ignoring unknown OIDC_CLIENT_AUTH_METHOD '{other}'"),
            }
        }
        Self::apply_numeric_env_override("OIDC_CLOCK_TOLERANCE", &mut settings.clock_tolerance);
        Self::apply_numeric_env_override("OIDC_HTTP_TIMEOUT", &mut settings.http_timeout_ms);
        Self::apply_bool_env_override("OIDC_ENABLE_TELEMETRY", &mut settings.enable_telemetry);
        Self::apply_bool_env_override("OIDC_IDP_LOGOUT", &mut settings.idp_logout);
        Self::apply_bool_env_override("OIDC_PROVIDER_LOGOUT", &mut settings.provider_logout);
        Self::apply_string_env_override(
            "OIDC_ID_TOKEN_SIGNING_ALG",
            &mut settings.id_token_signing_alg,
        );
        Self::apply_bool_env_override(
            "OIDC_LEGACY_SAME_SITE_COOKIE",
            &mut settings.legacy_same_site_cookie,
        );
        if let Ok(organization) = std::env::var("OIDC_ORGANIZATION") {
            settings.organization = Some(organization).filter(|org| !org.trim().is_empty());
        }
    }

    fn apply_authorization_env_overrides(params: &mut AuthorizationParams) {
        Self::apply_string_env_override("OIDC_RESPONSE_TYPE", &mut params.response_type);
        Self::apply_string_env_override("OIDC_SCOPE", &mut params.scope);
        if let Ok(response_mode) = std::env::var("OIDC_RESPONSE_MODE") {
            params.response_mode = Some(response_mode);
        }
        if let Ok(audience) = std::env::var("OIDC_AUDIENCE") {
            params.audience = Some(audience);
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session: &mut SessionSettings) {
        Self::apply_string_env_override("OIDC_SESSION_NAME", &mut session.name);
        Self::apply_bool_env_override("OIDC_SESSION_ROLLING", &mut session.rolling);
        Self::apply_numeric_env_override(
            "OIDC_SESSION_ROLLING_DURATION",
            &mut session.rolling_duration,
        );
        if let Ok(value) = std::env::var("OIDC_SESSION_ABSOLUTE_DURATION") {
            session.absolute_duration = match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(seconds) => Some(seconds),
                Err(_) if is_falsey(&value) => None,
                Err(_) => Some(DEFAULT_ABSOLUTE_DURATION),
            };
        }

        let cookie = &mut session.cookie;
        if let Ok(domain) = std::env::var("OIDC_COOKIE_DOMAIN") {
            cookie.domain = Some(domain);
        }
        Self::apply_string_env_override("OIDC_COOKIE_PATH", &mut cookie.path);
        Self::apply_bool_env_override("OIDC_COOKIE_TRANSIENT", &mut cookie.transient);
        Self::apply_bool_env_override("OIDC_COOKIE_HTTP_ONLY", &mut cookie.http_only);
        if let Ok(secure) = std::env::var("OIDC_COOKIE_SECURE") {
            cookie.secure = Some(!is_falsey(&secure));
        }
        if let Ok(same_site) = std::env::var("OIDC_COOKIE_SAME_SITE") {
            match same_site.to_ascii_lowercase().as_str() {
                "lax" => cookie.same_site = SameSitePolicy::Lax,
                "strict" => cookie.same_site = SameSitePolicy::Strict,
                "none" => cookie.same_site = SameSitePolicy::None,
                other => log::warn!("Ignoring unknown OIDC_COOKIE_SAME_SITE '{other}'"),
            }
        }
    }

    fn apply_route_env_overrides(routes: &mut RouteSettings) {
        Self::apply_string_env_override("OIDC_LOGIN", &mut routes.login);
        Self::apply_string_env_override("OIDC_LOGOUT", &mut routes.logout);
        Self::apply_string_env_override("OIDC_CALLBACK", &mut routes.callback);
        Self::apply_string_env_override(
            "OIDC_POST_LOGOUT_REDIRECT",
            &mut routes.post_logout_redirect,
        );
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        Self::apply_string_env_override("HOST", &mut app_settings.host);
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        Self::apply_string_env_override("CORS_ORIGINS", &mut app_settings.cors_origins);
    }

    fn apply_string_env_override(env_var: &str, target: &mut String) {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                *target = value;
            }
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.trim().parse::<u64>() {
                *target = value;
            }
        }
    }

    fn apply_bool_env_override(env_var: &str, target: &mut bool) {
        if let Ok(value) = std::env::var(env_var) {
            *target = !is_falsey(&value);
        }
    }

    /// Fill in derived defaults: bare hostnames in `base_url` become https URLs
    /// and trailing slashes are dropped from both base URLs.
    pub fn normalize(&mut self) {
        if !self.base_url.is_empty() && !self.base_url.contains("://") {
            self.base_url = format!("https://{}", self.base_url);
        }
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }
        while self.issuer_base_url.ends_with('/') {
            self.issuer_base_url.pop();
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check the settings for missing or contradictory values
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secrets.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.secrets.iter().any(|s| s.len() < MIN_SECRET_LENGTH) {
            return Err(ConfigError::WeakSecret);
        }

        Self::validate_url("base_url", &self.base_url)?;
        Self::validate_url("issuer_base_url", &self.issuer_base_url)?;
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingField("client_id"));
        }

        self.validate_authorization_params()?;
        self.validate_signing()?;
        self.validate_session()?;

        if self.session.cookie.same_site == SameSitePolicy::None && !self.cookie_secure() {
            log::warn!("SameSite=None session cookies without Secure are rejected by most browsers");
        }

        Ok(())
    }

    fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::MissingField(field));
        }
        match url::Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(ConfigError::InvalidUrl {
                field,
                value: value.to_string(),
            }),
        }
    }

    fn validate_authorization_params(&self) -> Result<(), ConfigError> {
        let params = &self.authorization_params;
        validate_response_type(&params.response_type)?;
        validate_scope(&params.scope)?;

        let mode = effective_response_mode(&params.response_type, params.response_mode.as_deref());
        validate_response_mode(&params.response_type, mode)?;

        if params.response_type.contains("code") && self.client_secret.is_none() {
            return Err(ConfigError::MissingClientSecret("the code and hybrid flows"));
        }
        Ok(())
    }

    fn validate_signing(&self) -> Result<(), ConfigError> {
        match self.id_token_signing_alg.as_str() {
            "RS256" => Ok(()),
            "HS256" if self.client_secret.is_some() => Ok(()),
            "HS256" => Err(ConfigError::MissingClientSecret("HS256 ID token validation")),
            other => Err(ConfigError::UnsupportedSigningAlg(other.to_string())),
        }
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        let name_ok = SESSION_NAME_PATTERN
            .as_ref()
            .is_ok_and(|pattern| pattern.is_match(&session.name));
        if !name_ok {
            return Err(ConfigError::InvalidSessionName);
        }
        if session.rolling && session.rolling_duration == 0 {
            return Err(ConfigError::InvalidRollingDuration);
        }
        if !session.rolling && session.absolute_duration.is_none() {
            return Err(ConfigError::MissingAbsoluteDuration);
        }
        Ok(())
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    /// Whether session and transient cookies carry the `Secure` attribute
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.session
            .cookie
            .secure
            .unwrap_or_else(|| self.base_url.starts_with("https://"))
    }

    /// Absolute URL the provider redirects back to
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        url_join(&self.base_url, &self.routes.callback)
    }

    /// Post-logout destination, falling back to `base_url`
    #[must_use]
    pub fn post_logout_redirect(&self) -> String {
        let route = &self.routes.post_logout_redirect;
        if route.is_empty() {
            self.base_url.clone()
        } else if route.contains("://") {
            route.clone()
        } else {
            url_join(&self.base_url, route)
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// `true` for the values in [`FALSEY`], case-insensitively
#[must_use]
pub fn is_falsey(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    FALSEY.contains(&value.as_str())
}

/// Join a base URL and a path with exactly one slash between them
#[must_use]
pub fn url_join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// # Errors
///
/// Returns `InvalidResponseType` unless `response_type` is one of
/// [`SUPPORTED_RESPONSE_TYPES`].
pub fn validate_response_type(response_type: &str) -> Result<(), ConfigError> {
    if SUPPORTED_RESPONSE_TYPES.contains(&response_type) {
        Ok(())
    } else {
        Err(ConfigError::InvalidResponseType)
    }
}

/// # Errors
///
/// Returns `MissingOpenIdScope` when the space-separated scope lacks `openid`.
pub fn validate_scope(scope: &str) -> Result<(), ConfigError> {
    if scope.split_whitespace().any(|s| s == "openid") {
        Ok(())
    } else {
        Err(ConfigError::MissingOpenIdScope)
    }
}

/// Response types that return an ID token from the authorization endpoint
/// default to `form_post`; the code flow defaults to `query`.
#[must_use]
pub fn effective_response_mode<'a>(response_type: &str, response_mode: Option<&'a str>) -> &'a str {
    match response_mode {
        Some(mode) => mode,
        None if response_type.contains("id_token") => "form_post",
        None => "query",
    }
}

/// # Errors
///
/// Returns `InvalidResponseMode` for unknown modes and for `query` with
/// response types that carry tokens in the front channel.
pub fn validate_response_mode(response_type: &str, response_mode: &str) -> Result<(), ConfigError> {
    match response_mode {
        "form_post" => Ok(()),
        "query" if !response_type.contains("id_token") => Ok(()),
        other => Err(ConfigError::InvalidResponseMode(other.to_string())),
    }
}
