use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::cache::Payload;

/// The request failed before any HTTP response was obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    /// An intermediary (the caching proxy) reported the upstream unreachable.
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build an error for a non-2xx response.
    ///
    /// Message preference: the structured `error` field, then the decoded
    /// body, then a generic `HTTP <status>`.
    pub fn from_status(status: u16, body: &Payload) -> Self {
        let raw = match body {
            Payload::Json(value) => match value.get("error").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => match value {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            },
            Payload::Text(text) => text.trim().to_string(),
        };

        let message = if raw.is_empty() {
            format!("HTTP {}", status)
        } else {
            Self::truncate_body(&raw)
        };

        ApiError::Http { status, message }
    }

    /// True when no response was received, the only case where cached data
    /// may stand in for the network.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
