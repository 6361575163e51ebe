//! Error types for the oracle, split the way this codebase splits its
//! off-chain errors: a typed per-adapter error (`AdapterError`, modeled on
//! `feels_keeper::error::KeeperError`) the aggregator catches and logs, and
//! an HTTP-facing error (`OracleError`) that maps directly to a status
//! code and an envelope error string.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Stable error codes propagated in logs and envelope responses (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorCode {
    AuthMissing,
    AuthFailed,
    FetchFailed,
    HttpError,
    Blocked,
    Captcha,
    ScrapeFailed,
    ScraperApiError,
}

impl AdapterErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorCode::AuthMissing => "AUTH_MISSING",
            AdapterErrorCode::AuthFailed => "AUTH_FAILED",
            AdapterErrorCode::FetchFailed => "FETCH_FAILED",
            AdapterErrorCode::HttpError => "HTTP_ERROR",
            AdapterErrorCode::Blocked => "BLOCKED",
            AdapterErrorCode::Captcha => "CAPTCHA",
            AdapterErrorCode::ScrapeFailed => "SCRAPE_FAILED",
            AdapterErrorCode::ScraperApiError => "SCRAPER_API_ERROR",
        }
    }
}

/// Error raised by a source adapter. Caught at the aggregator boundary and
/// logged; never propagates to HTTP (spec.md §4.11, §7).
#[derive(Error, Debug, Clone)]
#[error("[{adapter}] {code}: {message}")]
pub struct AdapterError {
    pub adapter: String,
    pub code: AdapterErrorCode,
    pub message: String,
    pub cause: Option<String>,
}

impl std::fmt::Display for AdapterErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AdapterError {
    pub fn new(adapter: impl Into<String>, code: AdapterErrorCode, message: impl Into<String>) -> Self {
        Self { adapter: adapter.into(), code, message: message.into(), cause: None }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// HTTP-surface and envelope-surface errors (spec.md §4.7–§4.11, §7).
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("unknown asset '{0}'")]
    InvalidAsset(String),
    #[error("no price available for '{0}'")]
    NoPrice(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("history store unavailable")]
    HistoryUnavailable,
    #[error("history query failed: {0}")]
    HistoryQueryFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl OracleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            OracleError::InvalidAsset(_) => StatusCode::BAD_REQUEST,
            OracleError::NoPrice(_) => StatusCode::NOT_FOUND,
            OracleError::BadRequest(_) => StatusCode::BAD_REQUEST,
            OracleError::HistoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            OracleError::HistoryQueryFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OracleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OracleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if matches!(self, OracleError::HistoryUnavailable) {
            return (status, Json(json!({ "error": self.to_string(), "history": [] }))).into_response();
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_error_code_strings_match_spec() {
        assert_eq!(AdapterErrorCode::Blocked.as_str(), "BLOCKED");
        assert_eq!(AdapterErrorCode::Captcha.as_str(), "CAPTCHA");
        assert_eq!(AdapterErrorCode::AuthMissing.as_str(), "AUTH_MISSING");
    }

    #[test]
    fn oracle_error_status_codes() {
        assert_eq!(OracleError::InvalidAsset("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(OracleError::NoPrice("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(OracleError::HistoryUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
