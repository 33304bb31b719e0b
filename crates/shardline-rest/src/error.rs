//! REST errors

use std::time::Duration;
use thiserror::Error;

/// Error body returned by the API (`{"code": ..., "message": ...}`)
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub code: Option<u64>,
    pub message: String,
}

impl ApiError {
    /// Build from a status and raw body; non-JSON bodies become the message
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_slice(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(serde_json::Value::as_u64);
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| String::from_utf8_lossy(body).into_owned(), String::from);
        Self {
            status,
            code,
            message,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (status {}, code {code})", self.message, self.status),
            None => write!(f, "{} (status {})", self.message, self.status),
        }
    }
}

/// Rate limiter errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Request cancelled while waiting for a rate limit")]
    Cancelled,
}

/// HTTP transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Errors of one REST request
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Bad request: {0}")]
    BadRequest(ApiError),

    #[error("Unauthorized: {0}")]
    Unauthorized(ApiError),

    #[error("Forbidden: {0}")]
    Forbidden(ApiError),

    #[error("Not found: {0}")]
    NotFound(ApiError),

    #[error("Server error: {0}")]
    Server(ApiError),

    #[error("Unexpected response: {0}")]
    Http(ApiError),

    #[error("Rate limited (global: {global}), retry after {retry_after:?}")]
    RateLimited { retry_after: Duration, global: bool },

    #[error("Blocked at the network edge (429 without Via header)")]
    EdgeBanned,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    /// Map a non-success, non-429 status to its error
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let api = ApiError::from_body(status, body);
        match status {
            400 => Self::BadRequest(api),
            401 => Self::Unauthorized(api),
            403 => Self::Forbidden(api),
            404 => Self::NotFound(api),
            500..=599 => Self::Server(api),
            _ => Self::Http(api),
        }
    }

    /// HTTP status behind this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(api)
            | Self::Unauthorized(api)
            | Self::Forbidden(api)
            | Self::NotFound(api)
            | Self::Server(api)
            | Self::Http(api) => Some(api.status),
            Self::RateLimited { .. } | Self::EdgeBanned => Some(429),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::RateLimit(RateLimitError::Cancelled))
    }
}
