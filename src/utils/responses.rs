//! HTTP response helpers
//!
//! Consistent JSON error bodies (`{error, error_description}`) and JSON
//! success responses, with the most common error bodies serialized once.

use std::sync::LazyLock;

use actix_web::{http::header, http::StatusCode, HttpResponse};
use serde_json::{json, Value};

// ===============================
// CACHED RESPONSES
// ===============================

static CACHED_RESPONSES: LazyLock<CachedResponses> = LazyLock::new(CachedResponses::new);

/// Pre-serialized bodies for errors that never carry details
struct CachedResponses {
    unauthorized: String,
    server_error: String,
    invalid_request: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            unauthorized: Self::create_json(
                "unauthorized",
                "Authentication is required to access this resource",
            ),
            server_error: Self::create_json("server_error", "An internal server error occurred"),
            invalid_request: Self::create_json(
                "invalid_request",
                "The request is malformed or invalid",
            ),
        }
    }

    fn create_json(error: &str, description: &str) -> String {
        json!({
            "error": error,
            "error_description": description
        })
        .to_string()
    }

    fn respond(status: StatusCode, body: &str) -> HttpResponse {
        HttpResponse::build(status)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(body.to_string())
    }
}

/// Entry point for building JSON responses
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Error response for an arbitrary status
    #[must_use]
    pub fn error(status: StatusCode) -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(status)
    }

    /// 200 with a JSON body
    #[must_use]
    pub fn ok() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::OK)
    }
}

// ===============================
// BUILDER TYPES
// ===============================

pub struct ErrorResponseBuilder {
    status: StatusCode,
    error_code: Option<String>,
    description: Option<String>,
}

impl ErrorResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            error_code: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        if self.error_code.is_none() && self.description.is_none() {
            let cached = match self.status {
                StatusCode::UNAUTHORIZED => Some(&CACHED_RESPONSES.unauthorized),
                StatusCode::INTERNAL_SERVER_ERROR => Some(&CACHED_RESPONSES.server_error),
                StatusCode::BAD_REQUEST => Some(&CACHED_RESPONSES.invalid_request),
                _ => None,
            };
            if let Some(body) = cached {
                return CachedResponses::respond(self.status, body);
            }
        }

        let error_code = self
            .error_code
            .unwrap_or_else(|| default_error_code(self.status).to_string());
        let mut body = json!({ "error": error_code });
        if let Some(description) = self.description {
            body["error_description"] = Value::String(description);
        }

        HttpResponse::build(self.status)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .json(body)
    }
}

fn default_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::BAD_GATEWAY => "bad_gateway",
        StatusCode::GATEWAY_TIMEOUT => "gateway_timeout",
        _ => "server_error",
    }
}

pub struct JsonResponseBuilder {
    status: StatusCode,
    headers: Vec<(String, String)>,
}

impl JsonResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn json<T: serde::Serialize>(self, data: &T) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status);
        for (name, value) in self.headers {
            builder.insert_header((name, value));
        }
        builder.json(data)
    }
}
