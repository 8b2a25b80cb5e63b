use serde_json::Value;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// The server's `{"detail": "..."}` message if it sent one, else the body.
    fn detail(body: &str) -> String {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => match map.get("detail") {
                Some(Value::String(detail)) => Self::truncate_body(detail),
                Some(other) => Self::truncate_body(&other.to_string()),
                None => Self::truncate_body(body),
            },
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::detail(body);
        match status.as_u16() {
            400 | 422 => ApiError::Validation(detail),
            401 => ApiError::Unauthorized(detail),
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(detail)
            | ApiError::AccessDenied(detail)
            | ApiError::Validation(detail) => AuthError::Rejected(detail),
            other => AuthError::Unreachable(other.to_string()),
        }
    }
}
