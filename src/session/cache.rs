//! Session Cache
//!
//! Per-request view of the session cookie. The first read decodes the
//! cookie and memoizes the outcome in the request's extension slot, so
//! guards, handlers and the rolling middleware all observe the same state.
//! Writes (`create`, `touch`, `destroy`) update the memo as well.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::context::{RequestContext, ResponseContext};
use crate::models::{Session, SessionState, TokenSet, UnauthenticatedReason};
use crate::session::chunk::CookieChunkSet;
use crate::session::clock::Clock;
use crate::session::codec::{EnvelopeStamp, SessionCodec};
use crate::utils::crypto::CryptoError;

/// Memoized session outcome for one request
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSession {
    pub state: SessionState,
    /// Stamp of the envelope the state came from, when authenticated
    pub stamp: Option<EnvelopeStamp>,
    /// Whether the response already carries session cookies for this request
    pub written: bool,
}

#[derive(Clone)]
pub struct SessionCache {
    codec: SessionCodec,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new(codec: SessionCodec, clock: Arc<dyn Clock>) -> Self {
        Self { codec, clock }
    }

    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Resolve the session for this request, decoding the cookie at most once
    pub fn get<R: RequestContext + ?Sized>(&self, req: &R) -> SessionState {
        self.load(req).state
    }

    fn load<R: RequestContext + ?Sized>(&self, req: &R) -> CachedSession {
        if let Some(cached) = req.cached_session() {
            return cached;
        }

        let (state, stamp) = match self.read(req) {
            Ok((session, stamp)) => (SessionState::Authenticated(session), Some(stamp)),
            Err(reason) => {
                match reason {
                    UnauthenticatedReason::NoSession => {}
                    UnauthenticatedReason::Expired => {
                        debug!("Session cookie present but expired");
                    }
                    other => warn!("Discarding session cookie: {other}"),
                }
                (SessionState::Unauthenticated(reason), None)
            }
        };

        let entry = CachedSession {
            state,
            stamp,
            written: false,
        };
        req.cache_session(entry.clone());
        entry
    }

    fn read<R: RequestContext + ?Sized>(
        &self,
        req: &R,
    ) -> Result<(Session, EnvelopeStamp), UnauthenticatedReason> {
        let cookies = req.read_cookies();
        let set = CookieChunkSet::from_cookies(
            self.codec.cookie_name(),
            cookies.iter().map(|(n, v)| (n.as_str(), v.as_str())),
        )
        .map_err(|e| {
            debug!("{e}");
            UnauthenticatedReason::IncompleteChunks
        })?
        .ok_or(UnauthenticatedReason::NoSession)?;

        self.codec.decode(&set, self.clock.now())
    }

    /// Persist a freshly authenticated session.
    ///
    /// # Errors
    ///
    /// Returns a `CryptoError` if the session cannot be sealed.
    pub fn create<R, W>(&self, req: &R, res: &mut W, session: Session) -> Result<(), CryptoError>
    where
        R: RequestContext + ?Sized,
        W: ResponseContext + ?Sized,
    {
        let now = self.clock.now();
        let stamp = self.codec.stamp(now, now);
        self.write(req, res, &session, &stamp)?;
        info!(
            "Session created for subject {}",
            session.sub().unwrap_or("<unknown>")
        );
        Ok(())
    }

    /// Re-issue the session cookie with `uat = now` for rolling sessions.
    ///
    /// Returns `true` when a cookie was written.
    ///
    /// # Errors
    ///
    /// Returns a `CryptoError` if the session cannot be sealed.
    pub fn touch<R, W>(&self, req: &R, res: &mut W) -> Result<bool, CryptoError>
    where
        R: RequestContext + ?Sized,
        W: ResponseContext + ?Sized,
    {
        if !self.codec.is_rolling() {
            return Ok(false);
        }

        let cached = self.load(req);
        if cached.written {
            return Ok(false);
        }
        let (SessionState::Authenticated(session), Some(previous)) = (cached.state, cached.stamp)
        else {
            return Ok(false);
        };

        let stamp = self.codec.stamp(previous.iat, self.clock.now());
        self.write(req, res, &session, &stamp)?;
        debug!("Rolling session renewed until {}", stamp.exp);
        Ok(true)
    }

    /// Clear every session cookie the request carries
    pub fn destroy<R, W>(&self, req: &R, res: &mut W)
    where
        R: RequestContext + ?Sized,
        W: ResponseContext + ?Sized,
    {
        let name = self.codec.cookie_name();
        let mut cleared = vec![name.to_string(), CookieChunkSet::count_name(name)];
        for (cookie_name, _) in req.read_cookies() {
            if CookieChunkSet::belongs_to(name, &cookie_name) && !cleared.contains(&cookie_name) {
                cleared.push(cookie_name);
            }
        }
        for cookie_name in &cleared {
            res.set_cookie(self.codec.clearing_cookie(cookie_name));
        }

        req.cache_session(CachedSession {
            state: SessionState::Unauthenticated(UnauthenticatedReason::LoggedOut),
            stamp: None,
            written: true,
        });
        info!("Session destroyed");
    }

    /// Session for a completed callback, stamped with the current time
    #[must_use]
    pub fn from_token_set(&self, token_set: &TokenSet) -> Session {
        Session::from_token_set(token_set, self.clock.now())
    }

    fn write<R, W>(
        &self,
        req: &R,
        res: &mut W,
        session: &Session,
        stamp: &EnvelopeStamp,
    ) -> Result<(), CryptoError>
    where
        R: RequestContext + ?Sized,
        W: ResponseContext + ?Sized,
    {
        let set = self.codec.encode(session, stamp)?;
        let written = set.cookie_names();

        // Chunks from a previous, larger envelope would corrupt the next read
        let name = self.codec.cookie_name();
        for (cookie_name, _) in req.read_cookies() {
            if CookieChunkSet::belongs_to(name, &cookie_name) && !written.contains(&cookie_name) {
                res.set_cookie(self.codec.clearing_cookie(&cookie_name));
            }
        }
        for cookie in self.codec.cookies(&set, stamp) {
            res.set_cookie(cookie);
        }

        req.cache_session(CachedSession {
            state: SessionState::Authenticated(self.codec.filtered(session)),
            stamp: Some(*stamp),
            written: true,
        });
        Ok(())
    }
}
