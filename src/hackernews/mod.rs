//! Hacker News read API: item client, retry classification, and the
//! negative-aware on-disk cache with single-flight deduplication.

mod cache;
mod client;
mod types;

pub use cache::CachedClient;
pub use client::{discussion_url, HnClient, DEFAULT_BASE_URL};
pub use types::{HnError, Item};
