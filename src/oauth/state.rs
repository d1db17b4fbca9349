use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AuthError;

/// Login state carried through the provider in the `state` parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationState {
    #[serde(rename = "returnTo", default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    /// Uniqueness salt; the same value is stored in the state cookie
    #[serde(default)]
    pub nonce: String,
    /// Application fields from the login state hook
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl AuthorizationState {
    /// Build state from a hook-provided value, which must be a JSON object
    ///
    /// # Errors
    ///
    /// Returns `AuthError::BadRequest` for anything other than an object.
    pub fn from_value(value: Value, nonce: String) -> Result<Self, AuthError> {
        let Value::Object(mut custom) = value else {
            return Err(AuthError::BadRequest(
                "Custom state value must be an object.".to_string(),
            ));
        };
        let return_to = match custom.remove("returnTo") {
            Some(Value::String(return_to)) => Some(return_to),
            _ => None,
        };
        custom.remove("nonce");
        Ok(Self {
            return_to,
            nonce,
            custom,
        })
    }
}

/// `base64url(JSON(state))`
#[must_use]
pub fn encode_state(state: &AuthorizationState) -> String {
    // Serializing a map of JSON values cannot fail
    let json = serde_json::to_vec(state).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Inverse of [`encode_state`]; `None` for anything that is not our state
#[must_use]
pub fn decode_state(encoded: &str) -> Option<AuthorizationState> {
    let json = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    serde_json::from_slice(&json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_with_custom_fields() {
        let state = AuthorizationState::from_value(
            json!({"returnTo": "/profile", "tenant": "acme"}),
            "salt".to_string(),
        )
        .unwrap();
        assert_eq!(state.return_to.as_deref(), Some("/profile"));
        assert_eq!(state.custom.get("tenant"), Some(&json!("acme")));

        let decoded = decode_state(&encode_state(&state)).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_encoded_state_uses_return_to_key() {
        let state = AuthorizationState {
            return_to: Some("/".to_string()),
            nonce: "n".to_string(),
            custom: Map::new(),
        };
        let json = URL_SAFE_NO_PAD.decode(encode_state(&state)).unwrap();
        let value: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value, json!({"returnTo": "/", "nonce": "n"}));
    }

    #[test]
    fn test_non_object_state_is_rejected() {
        let error = AuthorizationState::from_value(json!("just a string"), String::new()).unwrap_err();
        assert_eq!(error.to_string(), "Custom state value must be an object.");
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_state("%%%").is_none());
        assert!(decode_state(&URL_SAFE_NO_PAD.encode("[1,2]")).is_none());
    }
}
