pub mod envelope;
pub mod upstream;
pub mod xml;

use std::error::Error as StdError;

use shared::{
    domain::{ListingQuery, PerformanceId},
    error::{ApiError, ErrorCode},
    protocol::{PerformanceDetailResponse, PerformanceListResponse},
};
use tracing::error;

use crate::upstream::{KopisClient, UpstreamError};

#[derive(Clone)]
pub struct ApiContext {
    pub upstream: KopisClient,
}

/// Checks the caller-supplied KOPIS key. Empty counts as missing.
pub fn require_api_key(raw: Option<String>) -> Result<String, ApiError> {
    raw.filter(|key| !key.is_empty()).ok_or_else(|| {
        ApiError::new(
            ErrorCode::MissingApiKey,
            "the apiKey query parameter is required",
        )
    })
}

pub async fn list_performances(
    ctx: &ApiContext,
    query: ListingQuery,
) -> Result<PerformanceListResponse, ApiError> {
    let performances = ctx.upstream.fetch_listing(&query).await.map_err(|err| {
        error!(error = %error_chain(&err), "performance listing failed");
        ApiError::from(err)
    })?;
    Ok(PerformanceListResponse::new(performances))
}

pub async fn performance_detail(
    ctx: &ApiContext,
    id: PerformanceId,
    api_key: &str,
) -> Result<PerformanceDetailResponse, ApiError> {
    let performance = ctx
        .upstream
        .fetch_detail(&id, api_key)
        .await
        .map_err(|err| {
            error!(%id, error = %error_chain(&err), "performance detail failed");
            ApiError::from(err)
        })?;
    Ok(PerformanceDetailResponse::new(performance))
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        let code = match &err {
            UpstreamError::Timeout(_) => ErrorCode::UpstreamTimeout,
            UpstreamError::Malformed(_) => ErrorCode::UpstreamMalformed,
            UpstreamError::Transport(_) | UpstreamError::Status(_) => ErrorCode::UpstreamFailure,
            UpstreamError::InvalidBaseUrl { .. }
            | UpstreamError::CannotBeABase(_)
            | UpstreamError::Client(_) => ErrorCode::Internal,
        };
        ApiError::new(code, error_chain(&err))
    }
}

/// Joins an error and its sources into one line.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
