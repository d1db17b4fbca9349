use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated user session persisted in the encrypted session cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// ID token claims after the identity claim filter has been applied
    #[serde(default)]
    pub user: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Access token expiry, epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Login time, epoch seconds
    pub created_at: i64,
}

impl Session {
    #[must_use]
    pub fn new(user: Map<String, Value>, created_at: i64) -> Self {
        Self {
            user,
            id_token: None,
            access_token: None,
            access_token_scope: None,
            refresh_token: None,
            token_type: None,
            expires_at: None,
            created_at,
        }
    }

    /// Build a session from a token set, keeping the ID token claims as the user
    #[must_use]
    pub fn from_token_set(token_set: &TokenSet, created_at: i64) -> Self {
        Self {
            user: token_set.claims.clone(),
            id_token: token_set.id_token.clone(),
            access_token: token_set.access_token.clone(),
            access_token_scope: token_set.scope.clone(),
            refresh_token: token_set.refresh_token.clone(),
            token_type: token_set.token_type.clone(),
            expires_at: token_set.expires_at,
            created_at,
        }
    }

    /// Drop the named claims from the user map
    pub fn filter_claims<S: AsRef<str>>(&mut self, filter: &[S]) {
        for claim in filter {
            self.user.remove(claim.as_ref());
        }
    }

    /// Subject identifier, when present
    #[must_use]
    pub fn sub(&self) -> Option<&str> {
        self.user.get("sub").and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_access_token_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Why a request carries no usable session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No session cookie on the request
    NoSession,
    /// A chunked cookie set was missing pieces or declared a bad count
    IncompleteChunks,
    /// No key in the ring authenticated the envelope
    Undecryptable,
    /// The envelope decrypted but did not contain a session
    Malformed,
    Expired,
    /// The session was destroyed earlier in this request
    LoggedOut,
}

impl std::fmt::Display for UnauthenticatedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::NoSession => "no session cookie",
            Self::IncompleteChunks => "incomplete cookie chunks",
            Self::Undecryptable => "session cookie could not be decrypted",
            Self::Malformed => "malformed session payload",
            Self::Expired => "session expired",
            Self::LoggedOut => "session destroyed",
        };
        f.write_str(reason)
    }
}

/// Result of reading the session for a request
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Authenticated(Session),
    Unauthenticated(UnauthenticatedReason),
}

impl SessionState {
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unauthenticated(_) => None,
        }
    }

    #[must_use]
    pub fn into_session(self) -> Option<Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unauthenticated(_) => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Tokens returned by the identity provider for a completed callback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    /// Access token expiry, epoch seconds
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
    /// Validated ID token claims
    pub claims: Map<String, Value>,
}
