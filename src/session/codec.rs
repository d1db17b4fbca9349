//! Session Codec
//!
//! Converts a [`Session`] to and from its cookie representation:
//!
//! 1. Identity claims listed in the claim filter are dropped
//! 2. `{header: EnvelopeStamp, session}` is serialized as JSON
//! 3. The JSON is sealed with the key ring (AES-256-GCM)
//! 4. The envelope is split into a [`CookieChunkSet`]
//!
//! Decoding reverses each step. Every failure maps to an
//! [`UnauthenticatedReason`]; nothing here panics or propagates.

use actix_web::cookie::Cookie;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{Session, UnauthenticatedReason};
use crate::session::chunk::CookieChunkSet;
use crate::session::cookie::{build_cookie, expired_cookie, CookieLifetime, CookieOptions};
use crate::settings::RpSettings;
use crate::utils::crypto::{decrypt, encrypt_data, CryptoError, KeyRing};

/// Per-cookie byte budget, attributes included
pub const MAX_COOKIE_SIZE: usize = 4000;

/// Timing metadata sealed inside the envelope alongside the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeStamp {
    /// Login time
    pub iat: i64,
    /// Last time the session was re-issued
    pub uat: i64,
    /// Computed expiry
    pub exp: i64,
}

#[derive(Serialize)]
struct SealedRef<'a> {
    header: &'a EnvelopeStamp,
    session: &'a Session,
}

#[derive(Deserialize)]
struct Sealed {
    header: EnvelopeStamp,
    session: Session,
}

#[derive(Debug, Clone)]
pub struct SessionCodec {
    name: String,
    keys: KeyRing,
    options: CookieOptions,
    transient: bool,
    rolling: bool,
    rolling_duration: i64,
    absolute_duration: Option<i64>,
    claim_filter: Vec<String>,
}

impl SessionCodec {
    #[must_use]
    pub fn new(settings: &RpSettings, keys: KeyRing) -> Self {
        let session = &settings.session;
        Self {
            name: session.name.clone(),
            keys,
            options: Self::cookie_options(settings),
            transient: session.cookie.transient,
            rolling: session.rolling,
            rolling_duration: to_seconds(session.rolling_duration),
            absolute_duration: session.absolute_duration.map(to_seconds),
            claim_filter: settings.identity_claim_filter.clone(),
        }
    }

    /// Attributes every session cookie is written with
    #[must_use]
    pub fn cookie_options(settings: &RpSettings) -> CookieOptions {
        let cookie = &settings.session.cookie;
        CookieOptions {
            http_only: cookie.http_only,
            secure: settings.cookie_secure(),
            same_site: Some(cookie.same_site.into()),
            path: cookie.path.clone(),
            domain: cookie.domain.clone(),
        }
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    #[must_use]
    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    /// Expiry for a session logged in at `iat` and last touched at `uat`
    #[must_use]
    pub fn expiry(&self, iat: i64, uat: i64) -> i64 {
        match (self.rolling, self.absolute_duration) {
            (true, Some(absolute)) => (uat + self.rolling_duration).min(iat + absolute),
            (true, None) => uat + self.rolling_duration,
            (false, Some(absolute)) => iat + absolute,
            // Rejected by settings validation; expire immediately if reached
            (false, None) => iat,
        }
    }

    #[must_use]
    pub fn stamp(&self, iat: i64, now: i64) -> EnvelopeStamp {
        EnvelopeStamp {
            iat,
            uat: now,
            exp: self.expiry(iat, now),
        }
    }

    /// Copy of `session` without the filtered identity claims
    #[must_use]
    pub fn filtered(&self, session: &Session) -> Session {
        let mut session = session.clone();
        session.filter_claims(&self.claim_filter);
        session
    }

    /// Seal a session into a chunk set ready to be written as cookies.
    ///
    /// # Errors
    ///
    /// Returns a `CryptoError` if serialization or encryption fails.
    pub fn encode(
        &self,
        session: &Session,
        stamp: &EnvelopeStamp,
    ) -> Result<CookieChunkSet, CryptoError> {
        let session = self.filtered(session);
        let envelope = encrypt_data(
            &SealedRef {
                header: stamp,
                session: &session,
            },
            &self.keys,
        )?;

        Ok(CookieChunkSet::split(
            &self.name,
            &envelope,
            self.max_segment_size(),
        ))
    }

    /// Open a chunk set read from the request.
    ///
    /// # Errors
    ///
    /// Returns the reason the cookie does not represent a live session.
    pub fn decode(
        &self,
        set: &CookieChunkSet,
        now: i64,
    ) -> Result<(Session, EnvelopeStamp), UnauthenticatedReason> {
        let plaintext = decrypt(&set.join(), &self.keys).map_err(|e| {
            debug!("Session envelope rejected: {e}");
            UnauthenticatedReason::Undecryptable
        })?;
        let sealed: Sealed = serde_json::from_slice(&plaintext).map_err(|e| {
            debug!("Session payload is not a session: {e}");
            UnauthenticatedReason::Malformed
        })?;

        if self.is_expired(&sealed.header, now) {
            return Err(UnauthenticatedReason::Expired);
        }
        Ok((sealed.session, sealed.header))
    }

    fn is_expired(&self, stamp: &EnvelopeStamp, now: i64) -> bool {
        if stamp.exp <= now {
            return true;
        }
        if self.rolling && stamp.uat + self.rolling_duration <= now {
            return true;
        }
        self.absolute_duration
            .is_some_and(|absolute| stamp.iat + absolute <= now)
    }

    /// Set-Cookies for every entry of a chunk set
    #[must_use]
    pub fn cookies(&self, set: &CookieChunkSet, stamp: &EnvelopeStamp) -> Vec<Cookie<'static>> {
        let lifetime = self.lifetime(stamp.exp);
        set.entries()
            .into_iter()
            .map(|(name, value)| build_cookie(&name, value, &self.options, lifetime))
            .collect()
    }

    #[must_use]
    pub fn clearing_cookie(&self, name: &str) -> Cookie<'static> {
        expired_cookie(name, &self.options)
    }

    /// Largest segment that still fits the per-cookie budget once the name
    /// and attributes are serialized alongside it. Measured against the widest
    /// index so that `name.10` and later fit as well as `name.0`.
    #[must_use]
    pub fn max_segment_size(&self) -> usize {
        let widest = build_cookie(
            &CookieChunkSet::chunk_name(&self.name, usize::MAX),
            String::new(),
            &self.options,
            self.lifetime(0),
        );
        MAX_COOKIE_SIZE.saturating_sub(widest.to_string().len())
    }

    fn lifetime(&self, exp: i64) -> CookieLifetime {
        if self.transient {
            CookieLifetime::Session
        } else {
            CookieLifetime::ExpiresAt(exp)
        }
    }
}

fn to_seconds(duration: u64) -> i64 {
    i64::try_from(duration).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::encrypt;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn settings() -> RpSettings {
        let mut settings = RpSettings::default();
        settings.base_url = "https://example.org".to_string();
        settings
    }

    fn codec_with(settings: &RpSettings, secrets: &[&str]) -> SessionCodec {
        SessionCodec::new(settings, KeyRing::from_secrets(secrets).unwrap())
    }

    fn session() -> Session {
        let user = json!({
            "sub": "user-1",
            "email": "a@example.com",
            "nonce": "abc",
            "aud": "client",
            "iat": NOW,
        });
        Session::new(user.as_object().cloned().unwrap(), NOW)
    }

    #[test]
    fn test_roundtrip_after_claim_filtering() {
        let codec = codec_with(&settings(), &["secret-one"]);
        let stamp = codec.stamp(NOW, NOW);
        let set = codec.encode(&session(), &stamp).unwrap();

        let (decoded, decoded_stamp) = codec.decode(&set, NOW + 10).unwrap();
        let mut expected = session();
        expected.filter_claims(crate::settings::DEFAULT_CLAIM_FILTER);
        assert_eq!(decoded, expected);
        assert_eq!(decoded_stamp, stamp);
        assert!(!decoded.user.contains_key("nonce"));
        assert_eq!(decoded.sub(), Some("user-1"));
    }

    #[test]
    fn test_key_rotation_still_decodes() {
        let settings = settings();
        let old = codec_with(&settings, &["key-one-secret", "key-two-secret"]);
        let stamp = old.stamp(NOW, NOW);
        let set = old.encode(&session(), &stamp).unwrap();

        let rotated = codec_with(&settings, &["key-two-secret", "key-one-secret"]);
        assert!(rotated.decode(&set, NOW).is_ok());

        let unrelated = codec_with(&settings, &["another-secret"]);
        assert_eq!(
            unrelated.decode(&set, NOW),
            Err(UnauthenticatedReason::Undecryptable)
        );
    }

    #[test]
    fn test_large_session_is_chunked_and_rejoined() {
        let codec = codec_with(&settings(), &["secret-one"]);
        let mut big = session();
        big.user
            .insert("blob".to_string(), json!("z".repeat(45_000)));
        let stamp = codec.stamp(NOW, NOW);
        let set = codec.encode(&big, &stamp).unwrap();
        assert!(set.len() > 10, "only {} chunks", set.len());

        for cookie in codec.cookies(&set, &stamp) {
            assert!(
                cookie.to_string().len() <= MAX_COOKIE_SIZE,
                "{} is {} bytes",
                cookie.name(),
                cookie.to_string().len()
            );
        }

        let entries = set.entries();
        let pairs: Vec<(&str, &str)> = entries
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        let read = CookieChunkSet::from_cookies("appSession", pairs)
            .unwrap()
            .unwrap();
        let (decoded, _) = codec.decode(&read, NOW).unwrap();
        assert_eq!(decoded.user.get("blob"), big.user.get("blob"));
    }

    #[test]
    fn test_expiry_rules() {
        let mut settings = settings();
        settings.session.rolling_duration = 100;
        settings.session.absolute_duration = Some(1_000);
        let codec = codec_with(&settings, &["secret-one"]);
        assert_eq!(codec.expiry(0, 0), 100);
        assert_eq!(codec.expiry(0, 950), 1_000);

        settings.session.absolute_duration = None;
        let codec = codec_with(&settings, &["secret-one"]);
        assert_eq!(codec.expiry(0, 950), 1_050);

        settings.session.rolling = false;
        settings.session.absolute_duration = Some(1_000);
        let codec = codec_with(&settings, &["secret-one"]);
        assert_eq!(codec.expiry(0, 950), 1_000);
    }

    #[test]
    fn test_expired_envelope_is_rejected() {
        let mut settings = settings();
        settings.session.rolling_duration = 100;
        let codec = codec_with(&settings, &["secret-one"]);
        let stamp = codec.stamp(NOW, NOW);
        let set = codec.encode(&session(), &stamp).unwrap();

        assert!(codec.decode(&set, NOW + 99).is_ok());
        assert_eq!(
            codec.decode(&set, NOW + 100),
            Err(UnauthenticatedReason::Expired)
        );
    }

    #[test]
    fn test_forged_stamp_cannot_outlive_absolute_duration() {
        let mut settings = settings();
        settings.session.absolute_duration = Some(1_000);
        let codec = codec_with(&settings, &["secret-one"]);
        let stamp = EnvelopeStamp {
            iat: NOW,
            uat: NOW + 990,
            exp: NOW + 5_000,
        };
        let set = codec.encode(&session(), &stamp).unwrap();
        assert_eq!(
            codec.decode(&set, NOW + 1_000),
            Err(UnauthenticatedReason::Expired)
        );
    }

    #[test]
    fn test_garbage_cookie_is_undecryptable() {
        let codec = codec_with(&settings(), &["secret-one"]);
        let set = CookieChunkSet::split("appSession", "not-an-envelope", 4000);
        assert_eq!(
            codec.decode(&set, NOW),
            Err(UnauthenticatedReason::Undecryptable)
        );
    }

    #[test]
    fn test_non_session_payload_is_malformed() {
        let keys = KeyRing::from_secrets(&["secret-one"]).unwrap();
        let codec = SessionCodec::new(&settings(), keys.clone());
        let envelope = encrypt(br#"{"hello":"world"}"#, &keys).unwrap();
        let set = CookieChunkSet::split("appSession", &envelope, 4000);
        assert_eq!(
            codec.decode(&set, NOW),
            Err(UnauthenticatedReason::Malformed)
        );
    }

    #[test]
    fn test_transient_cookie_has_no_expiry() {
        let mut settings = settings();
        settings.session.cookie.transient = true;
        let codec = codec_with(&settings, &["secret-one"]);
        let stamp = codec.stamp(NOW, NOW);
        let set = codec.encode(&session(), &stamp).unwrap();
        let cookies = codec.cookies(&set, &stamp);
        assert!(cookies.iter().all(|c| c.expires().is_none()));
    }
}
