//! Wire types and error taxonomy for the Hacker News Firebase API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{ErrorClass, Retryable};

/// A Hacker News item (story, comment, poll, ...).
/// See <https://github.com/HackerNews/API#items>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub id: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dead: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants: Option<u64>,
}

/// Fetch outcomes for a single item.
///
/// `NotFound`, `Deleted`, and `Dead` are terminal item states; `Deleted` and
/// `Dead` are additionally cacheable (the item will never come back). The
/// type stays `Clone` so a single fetch result can be shared with every
/// concurrent caller waiting on the same id.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HnError {
    #[error("item not found")]
    NotFound,
    #[error("item is deleted")]
    Deleted,
    #[error("item is dead")]
    Dead,
    #[error("rate limited")]
    RateLimited,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<HnError>,
    },
}

impl HnError {
    /// True for outcomes worth persisting in the negative cache: the item is
    /// permanently gone and refetching can never change the answer.
    pub fn is_permanent(&self) -> bool {
        matches!(self, HnError::Deleted | HnError::Dead)
    }
}

impl Retryable for HnError {
    fn classify(&self) -> ErrorClass {
        match self {
            HnError::NotFound
            | HnError::Deleted
            | HnError::Dead
            | HnError::Cancelled
            | HnError::Exhausted { .. } => ErrorClass::Terminal,
            HnError::RateLimited => ErrorClass::RateLimited,
            HnError::Status(_) | HnError::Network(_) | HnError::Decode(_) => ErrorClass::Transient,
        }
    }

    fn cancelled() -> Self {
        HnError::Cancelled
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        HnError::Exhausted {
            attempts,
            source: Box::new(last),
        }
    }
}
