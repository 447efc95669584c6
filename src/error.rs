//! Error types for n8n-bridge

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for n8n-bridge
pub type Result<T> = std::result::Result<T, Error>;

/// n8n-bridge errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required configuration is absent
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// Request body was not valid JSON
    #[error("Invalid JSON body: {0}")]
    BodyParse(String),

    /// Request body failed schema validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Client exceeded the request quota
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Upstream call did not complete within the configured bound
    #[error("Upstream timeout: {0}")]
    Timeout(String),

    /// Transport-level failure reaching the upstream
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream responded with a non-success HTTP status
    #[error("Upstream HTTP error {status}: {message}")]
    UpstreamHttp {
        /// HTTP status returned by the upstream
        status: u16,
        /// Best-effort message extracted from the response body
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level error codes surfaced to API callers.
///
/// `ENV_MISSING` lets operators distinguish "misconfigured deployment"
/// from "upstream is down".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Required environment configuration is absent
    #[serde(rename = "ENV_MISSING")]
    EnvMissing,
    /// Request rejected by schema validation
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    /// Upstream call aborted after the configured timeout
    #[serde(rename = "TIMEOUT")]
    Timeout,
    /// Transport-level failure reaching the upstream
    #[serde(rename = "NETWORK_ERROR")]
    NetworkError,
    /// n8n responded with a non-success HTTP status
    #[serde(rename = "N8N_HTTP_ERROR")]
    N8nHttpError,
    /// Airtable responded with a non-success HTTP status
    #[serde(rename = "AIRTABLE_HTTP_ERROR")]
    AirtableHttpError,
    /// Anything that does not fit the vocabulary above
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// Structured error payload carried inside response envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message
    pub message: String,
    /// HTTP status reported by the failing upstream, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Machine-readable code from the fixed vocabulary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ApiError {
    /// Create an error carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    /// Create an error with a code but no upstream status.
    pub fn coded(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: Some(code),
        }
    }

    /// HTTP status this error maps to at the response boundary.
    #[must_use]
    pub fn status_or_default(&self) -> u16 {
        self.status.unwrap_or(500)
    }
}
