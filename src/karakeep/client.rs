//! Karakeep API client: request plumbing, auth, and error classification.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::retry::{self, ErrorClass, RetryPolicy, Retryable};

const USER_AGENT: &str = concat!("hnkeep/", env!("CARGO_PKG_VERSION"));

/// Outcomes for Karakeep API calls.
///
/// The write API is stricter than the read side: auth failures, missing
/// targets, and other 4xx responses are terminal; 429 and 5xx retry.
#[derive(Debug, Error)]
pub enum KarakeepError {
    #[error("unauthorized, check your API key")]
    Unauthorized,
    #[error("bookmark not found")]
    BookmarkNotFound,
    #[error("rate limited")]
    RateLimited,
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("decoding response: {0}")]
    Decode(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<KarakeepError>,
    },
}

impl Retryable for KarakeepError {
    fn classify(&self) -> ErrorClass {
        match self {
            KarakeepError::Unauthorized
            | KarakeepError::BookmarkNotFound
            | KarakeepError::Cancelled
            | KarakeepError::Exhausted { .. } => ErrorClass::Terminal,
            // client errors won't improve with retries; 429 never lands
            // here, it is mapped to RateLimited first
            KarakeepError::Api { status, .. } if (400..500).contains(status) => {
                ErrorClass::Terminal
            }
            KarakeepError::RateLimited => ErrorClass::RateLimited,
            KarakeepError::Api { .. }
            | KarakeepError::Network(_)
            | KarakeepError::Decode(_) => ErrorClass::Transient,
        }
    }

    fn cancelled() -> Self {
        KarakeepError::Cancelled
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        KarakeepError::Exhausted {
            attempts,
            source: Box::new(last),
        }
    }
}

/// Client for a Karakeep server's REST API.
pub struct KarakeepClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl KarakeepClient {
    /// Builds a client for `base_url` (trailing slash tolerated) using
    /// bearer `api_key` auth and the given per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, KarakeepError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| KarakeepError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(super) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Starts a request against `path` with auth and accept headers set.
    /// The API speaks JSON in both directions.
    pub(super) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Sends a request and maps the statuses every endpoint shares:
    /// 401 is a fatal auth error and 429 asks us to back off.
    pub(super) async fn send(&self, request: RequestBuilder) -> Result<Response, KarakeepError> {
        let response = request
            .send()
            .await
            .map_err(|e| KarakeepError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(KarakeepError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(KarakeepError::RateLimited);
        }
        Ok(response)
    }

    /// Turns an unexpected response into a [`KarakeepError::Api`], pulling
    /// the server's `{"message": ...}` body out when present.
    pub(super) async fn api_error(&self, response: Response) -> KarakeepError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.trim().to_string());
        KarakeepError::Api { status, message }
    }

    /// Verifies the server is reachable and the API key works.
    /// Used as the upfront precondition check before a sync run.
    pub async fn check_connectivity(&self, token: &CancellationToken) -> Result<(), KarakeepError> {
        retry::execute(&self.retry, token, || self.whoami_once()).await
    }

    async fn whoami_once(&self) -> Result<(), KarakeepError> {
        let response = self.send(self.request(Method::GET, "/users/me")).await?;
        if !response.status().is_success() {
            return Err(self.api_error(response).await);
        }
        Ok(())
    }
}
