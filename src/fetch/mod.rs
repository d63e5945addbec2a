//! HTTP page fetching with response classification.
//!
//! [`HttpFetcher`] issues exactly one GET per call and folds every expected
//! failure (timeouts, DNS, resets, unexpected statuses) into a
//! [`FetchOutcome`]. Nothing is retried here; callers decide whether to skip
//! the page, back off or give up on the store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::traits::PageFetcher;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Classification of a single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200 with the response body
    Success { body: String },
    /// HTTP 429 or 503: the site is pushing back, do not retry right away
    SoftBlock { status: u16 },
    /// Any other status, or a transport fault
    HardError(HardError),
}

/// What went wrong on a hard-error fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardError {
    Status(u16),
    Transport(String),
}

impl std::fmt::Display for HardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardError::Status(status) => write!(f, "unexpected HTTP status {status}"),
            HardError::Transport(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

impl FetchOutcome {
    /// Maps a status code (and, for 200, the body) onto an outcome.
    #[must_use]
    pub fn classify(status: StatusCode, body: Option<String>) -> Self {
        match status {
            StatusCode::OK => Self::Success {
                body: body.unwrap_or_default(),
            },
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => Self::SoftBlock {
                status: status.as_u16(),
            },
            other => Self::HardError(HardError::Status(other.as_u16())),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Header set sent with every store request unless overridden.
#[must_use]
pub fn default_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(USER_AGENT, agent);
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// reqwest-backed [`PageFetcher`]
pub struct HttpFetcher {
    client: Client,
    defaults: HeaderMap,
}

impl HttpFetcher {
    /// Creates a fetcher with a per-request `timeout` and the default header
    /// set built around `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the underlying client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            defaults: default_headers(user_agent),
        })
    }

    /// Like [`HttpFetcher::new`] but keeps cookies between requests, the way
    /// a browser session would.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the underlying client cannot be built.
    pub fn with_session(timeout: Duration, defaults: HeaderMap) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .cookie_store(true)
            .build()?;

        Ok(Self { client, defaults })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> FetchOutcome {
        let mut merged = self.defaults.clone();
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }

        debug!(url, "GET");
        let response = match self.client.get(url).headers(merged).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "request failed");
                return FetchOutcome::HardError(HardError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            let outcome = FetchOutcome::classify(status, None);
            warn!(url, status = status.as_u16(), "non-200 response");
            return outcome;
        }

        match response.text().await {
            Ok(body) => FetchOutcome::Success { body },
            Err(e) => {
                warn!(url, error = %e, "failed to read response body");
                FetchOutcome::HardError(HardError::Transport(e.to_string()))
            }
        }
    }
}
