use std::time::Duration;

use shared::domain::{ListingQuery, PerformanceId, PerformanceRecord};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::envelope::{Envelope, EnvelopeError};

pub const DEFAULT_BASE_URL: &str = "http://www.kopis.or.kr/openApi/restful";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

const PERFORMANCE_PATH: &str = "pblprfr";
const SERVICE_KEY_PARAM: &str = "service";
const REDACTED: &str = "***";

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream base url '{url}'")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("upstream base url '{0}' cannot carry a path")]
    CannotBeABase(String),
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("KOPIS did not respond within {0:?}")]
    Timeout(Duration),
    #[error("KOPIS request failed")]
    Transport(#[source] reqwest::Error),
    #[error("KOPIS responded with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Malformed(#[from] EnvelopeError),
}

/// Client for the KOPIS performance endpoints. Each call is a single GET
/// with no retries.
#[derive(Debug, Clone)]
pub struct KopisClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl KopisClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|source| UpstreamError::InvalidBaseUrl {
                url: config.base_url.clone(),
                source,
            })?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::CannotBeABase(config.base_url));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            http,
            base_url,
            timeout: config.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn listing_url(&self, query: &ListingQuery) -> Url {
        let mut url = self.endpoint(&[PERFORMANCE_PATH]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair(SERVICE_KEY_PARAM, &query.api_key)
                .append_pair("stdate", &query.stdate)
                .append_pair("eddate", &query.eddate)
                .append_pair("cpage", &query.cpage)
                .append_pair("rows", &query.rows)
                .append_pair("sharea", &query.sharea);
            if let Some(genre) = query.genre.as_deref().filter(|genre| !genre.is_empty()) {
                pairs.append_pair("shcate", genre);
            }
        }
        url
    }

    pub fn detail_url(&self, id: &PerformanceId, api_key: &str) -> Url {
        let mut url = self.endpoint(&[PERFORMANCE_PATH, &id.0]);
        url.query_pairs_mut().append_pair(SERVICE_KEY_PARAM, api_key);
        url
    }

    pub async fn fetch_listing(
        &self,
        query: &ListingQuery,
    ) -> Result<Vec<PerformanceRecord>, UpstreamError> {
        let url = self.listing_url(query);
        info!(url = %redact_service_key(&url), "calling KOPIS performance listing");

        let body = self.get_text(url).await?;
        let performances = Envelope::parse(&body)?.into_performances();
        info!(count = performances.len(), "KOPIS performance listing fetched");
        Ok(performances)
    }

    pub async fn fetch_detail(
        &self,
        id: &PerformanceId,
        api_key: &str,
    ) -> Result<PerformanceRecord, UpstreamError> {
        let url = self.detail_url(id, api_key);
        info!(url = %redact_service_key(&url), %id, "calling KOPIS performance detail");

        let body = self.get_text(url).await?;
        Ok(Envelope::parse(&body)?.into_single()?)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_text(&self, url: Url) -> Result<String, UpstreamError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| self.classify(error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        response.text().await.map_err(|error| self.classify(error))
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Transport(error.without_url())
        }
    }
}

/// Renders `url` with the caller's service key masked, for logs.
pub fn redact_service_key(url: &Url) -> String {
    if !url.query_pairs().any(|(key, _)| key == SERVICE_KEY_PARAM) {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == SERVICE_KEY_PARAM {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
#[path = "tests/upstream_tests.rs"]
mod tests;
