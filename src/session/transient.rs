//! Transient Store
//!
//! Short-lived signed cookies carrying `state`, `nonce`, `max_age` and the
//! PKCE `code_verifier` from the login redirect to the callback. Each value
//! is written as `value.exp.signature`, where the signature is an HMAC over
//! `name=value.exp`. Reading a value always clears it.

use std::sync::Arc;

use actix_web::cookie::SameSite;
use log::{debug, warn};

use crate::context::{RequestContext, ResponseContext};
use crate::session::clock::Clock;
use crate::session::cookie::{build_cookie, expired_cookie, CookieLifetime, CookieOptions};
use crate::settings::RpSettings;
use crate::utils::crypto::{sign_cookie, verify_cookie, CryptoError, KeyRing};

pub const STATE: &str = "state";
pub const NONCE: &str = "nonce";
pub const MAX_AGE: &str = "max_age";
pub const CODE_VERIFIER: &str = "code_verifier";

/// Every transient cookie the login flow may write
pub const TRANSIENT_NAMES: &[&str] = &[STATE, NONCE, MAX_AGE, CODE_VERIFIER];

pub const TRANSIENT_LIFETIME_SECS: i64 = 600;

const LEGACY_PREFIX: char = '_';

#[derive(Clone)]
pub struct TransientStore {
    keys: KeyRing,
    clock: Arc<dyn Clock>,
    secure: bool,
    domain: Option<String>,
    legacy_same_site: bool,
}

impl std::fmt::Debug for TransientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientStore")
            .field("secure", &self.secure)
            .field("domain", &self.domain)
            .field("legacy_same_site", &self.legacy_same_site)
            .finish_non_exhaustive()
    }
}

impl TransientStore {
    #[must_use]
    pub fn new(settings: &RpSettings, keys: KeyRing, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            clock,
            secure: settings.cookie_secure(),
            domain: settings.session.cookie.domain.clone(),
            legacy_same_site: settings.legacy_same_site_cookie,
        }
    }

    /// Write a signed transient value.
    ///
    /// `SameSite=None` cookies are always `Secure`; with the legacy fallback
    /// enabled a second `_name` cookie without SameSite is written too.
    ///
    /// # Errors
    ///
    /// Returns a `CryptoError` if the value cannot be signed.
    pub fn save<W: ResponseContext + ?Sized>(
        &self,
        res: &mut W,
        name: &str,
        value: &str,
        same_site: SameSite,
    ) -> Result<(), CryptoError> {
        let exp = self.clock.now() + TRANSIENT_LIFETIME_SECS;
        let payload = format!("{value}.{exp}");
        let cross_site = same_site == SameSite::None;

        let options = CookieOptions {
            same_site: Some(same_site),
            secure: self.secure || cross_site,
            ..self.options()
        };
        let signature = sign_cookie(name, &payload, &self.keys)?;
        res.set_cookie(build_cookie(
            name,
            format!("{payload}.{signature}"),
            &options,
            CookieLifetime::MaxAge(TRANSIENT_LIFETIME_SECS),
        ));

        if cross_site && self.legacy_same_site {
            let legacy_name = legacy_name(name);
            let options = CookieOptions {
                same_site: None,
                ..self.options()
            };
            let signature = sign_cookie(&legacy_name, &payload, &self.keys)?;
            res.set_cookie(build_cookie(
                &legacy_name,
                format!("{payload}.{signature}"),
                &options,
                CookieLifetime::MaxAge(TRANSIENT_LIFETIME_SECS),
            ));
        }
        Ok(())
    }

    /// Consume a transient value.
    ///
    /// The cookie (and its legacy twin) is cleared whether or not the value
    /// verifies. Tampered or expired values read as `None`.
    pub fn read<R, W>(&self, req: &R, res: &mut W, name: &str) -> Option<String>
    where
        R: RequestContext + ?Sized,
        W: ResponseContext + ?Sized,
    {
        let legacy_name = legacy_name(name);
        let primary = req.read_cookie(name);
        let legacy = if self.legacy_same_site {
            req.read_cookie(&legacy_name)
        } else {
            None
        };

        if primary.is_some() {
            res.set_cookie(expired_cookie(name, &self.options()));
        }
        if legacy.is_some() {
            res.set_cookie(expired_cookie(&legacy_name, &self.options()));
        }

        primary
            .and_then(|raw| self.verify(name, &raw))
            .or_else(|| legacy.and_then(|raw| self.verify(&legacy_name, &raw)))
    }

    /// Clear every transient cookie present on the request
    pub fn clear<R, W>(&self, req: &R, res: &mut W)
    where
        R: RequestContext + ?Sized,
        W: ResponseContext + ?Sized,
    {
        for name in TRANSIENT_NAMES {
            let legacy_name = legacy_name(name);
            for candidate in [name.to_string(), legacy_name] {
                if req.read_cookie(&candidate).is_some() {
                    res.set_cookie(expired_cookie(&candidate, &self.options()));
                }
            }
        }
    }

    fn verify(&self, name: &str, raw: &str) -> Option<String> {
        let mut parts = raw.rsplitn(3, '.');
        let (Some(signature), Some(exp), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            debug!("Transient cookie '{name}' is not signed");
            return None;
        };

        if !verify_cookie(name, &format!("{value}.{exp}"), signature, &self.keys) {
            warn!("Transient cookie '{name}' failed signature verification");
            return None;
        }
        match exp.parse::<i64>() {
            Ok(exp) if exp > self.clock.now() => Some(value.to_string()),
            _ => {
                debug!("Transient cookie '{name}' has expired");
                None
            }
        }
    }

    fn options(&self) -> CookieOptions {
        CookieOptions {
            http_only: true,
            secure: self.secure,
            same_site: Some(SameSite::Lax),
            path: "/".to_string(),
            domain: self.domain.clone(),
        }
    }
}

fn legacy_name(name: &str) -> String {
    format!("{LEGACY_PREFIX}{name}")
}
