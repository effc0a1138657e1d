//! Hacker News API client.

use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::{self, RetryPolicy};

use super::types::{HnError, Item};

/// Public Firebase endpoint for the Hacker News API.
pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

const USER_AGENT: &str = concat!("hnkeep/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Hacker News read API.
///
/// All requests go through the retry executor; see [`HnError`]'s
/// classification for what gets retried.
pub struct HnClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HnClient {
    pub fn new() -> Result<Self, HnError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| HnError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Points the client at a different base URL (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetches an item by id, retrying transient failures with backoff.
    pub async fn get_item(&self, token: &CancellationToken, id: u64) -> Result<Item, HnError> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        debug!(id, url = %url, "querying Hacker News API");
        retry::execute(&self.retry, token, || self.fetch_item(&url)).await
    }

    async fn fetch_item(&self, url: &str) -> Result<Item, HnError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HnError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(HnError::RateLimited);
        }
        if !status.is_success() {
            return Err(HnError::Status(status.as_u16()));
        }

        // the API returns 200 with a literal `null` body for missing items
        let item: Option<Item> = response
            .json()
            .await
            .map_err(|e| HnError::Decode(e.to_string()))?;
        let item = match item {
            Some(item) if item.id != 0 => item,
            _ => return Err(HnError::NotFound),
        };

        if item.deleted {
            return Err(HnError::Deleted);
        }
        if item.dead {
            return Err(HnError::Dead);
        }

        Ok(item)
    }
}

/// The news.ycombinator.com discussion permalink for an item.
pub fn discussion_url(id: u64) -> String {
    format!("https://news.ycombinator.com/item?id={id}")
}
