//! Karakeep write API client.
//!
//! Built against Karakeep v0.30.0:
//! - API routes (http layer): packages/api/routes/bookmarks.ts
//! - TRPC routers (business logic): packages/trpc/routers/bookmarks.ts
//! - Shared types: packages/shared/types/bookmarks.ts

mod bookmarks;
mod client;
mod types;

pub use client::{KarakeepClient, KarakeepError};
pub use types::{
    CreateBookmarkResponse, ExistingBookmark, ListedBookmark, ListedContent,
};

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a unix timestamp (seconds) as an RFC3339/ISO8601 string the API
/// accepts. Out-of-range values clamp to the epoch.
pub fn unix_to_rfc3339(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an RFC3339/ISO8601 string into a unix timestamp (seconds).
pub fn rfc3339_to_unix(value: &str) -> Result<i64, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.timestamp())
}
