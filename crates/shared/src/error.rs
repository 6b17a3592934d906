use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    MissingApiKey,
    UpstreamTimeout,
    UpstreamMalformed,
    UpstreamFailure,
    NotFound,
    Internal,
}

impl ErrorCode {
    /// The tag sent in the `error` field.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::MissingApiKey => "missing_api_key",
            ErrorCode::UpstreamTimeout => "upstream_timeout",
            ErrorCode::UpstreamMalformed => "upstream_malformed",
            ErrorCode::UpstreamFailure => "upstream_failure",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure body shared by every JSON route.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "error")]
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
