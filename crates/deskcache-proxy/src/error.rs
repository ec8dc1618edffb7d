//! Error types for the deskcache proxy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// No response could be obtained from upstream.
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Precache failed for {path}: {reason}")]
    Install { path: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProxyError::Unreachable(_))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Storage(format!("Corrupt entry: {}", err))
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Unreachable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
