//! Elasticsearch client error types.

use std::sync::Arc;

use geocache_core::Error;

/// Errors from the Elasticsearch REST client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ElasticError {
    /// Base URL is not an absolute http(s) URL.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// Document or index does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write rejected because the document already exists.
    #[error("version conflict: {0}")]
    Conflict(String),

    /// Non-success HTTP status.
    #[error("HTTP error {status}: {reason}")]
    HttpError { status: u16, reason: String },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response body is not the expected JSON.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ElasticError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ElasticError::Timeout } else { ElasticError::Network(Arc::new(err)) }
    }
}

impl From<serde_json::Error> for ElasticError {
    fn from(err: serde_json::Error) -> Self {
        ElasticError::Parse(err.to_string())
    }
}

impl From<ElasticError> for Error {
    fn from(err: ElasticError) -> Self {
        match err {
            ElasticError::NotFound(what) => Error::NotFound(what),
            ElasticError::Timeout => Error::Timeout("elasticsearch request timed out".into()),
            ElasticError::Parse(msg) => Error::MalformedResponse(msg),
            other => Error::Upstream(other.to_string()),
        }
    }
}

/// Pull `error.reason` (or `error.type`) out of an error response body.
pub fn error_reason(body: &[u8]) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    error
        .and_then(|e| e.get("reason").or_else(|| e.get("type")).or(Some(e)))
        .and_then(|e| e.as_str().map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect())
}
