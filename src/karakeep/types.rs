//! Request/response wire types for the Karakeep REST API.

use serde::{Deserialize, Serialize};

/// Body for `POST /bookmarks`. Only link-type bookmarks are created here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookmarkRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CreateBookmarkRequest {
    pub fn link(
        url: impl Into<String>,
        created_at: impl Into<String>,
        title: Option<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            kind: "link".to_string(),
            url: url.into(),
            created_at: created_at.into(),
            title,
            note,
        }
    }
}

/// The bookmark as returned by `POST /bookmarks` (fresh or pre-existing).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBookmarkResponse {
    pub id: String,
    pub created_at: String,
    pub title: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRequest {
    pub tag_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachTagsRequest {
    pub tags: Vec<TagRequest>,
}

/// Body for `PATCH /bookmarks/{id}`; absent fields are left untouched
/// server-side.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookmarkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One page of `GET /bookmarks`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListBookmarksResponse {
    pub bookmarks: Vec<ListedBookmark>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListedBookmark {
    pub id: String,
    pub created_at: String,
    pub note: Option<String>,
    pub content: Option<ListedContent>,
}

/// Discriminated union over bookmark content. Unknown types parse as
/// `Other`, mirroring the API's lenient import parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ListedContent {
    Link {
        url: String,
    },
    Asset {
        #[serde(rename = "sourceUrl")]
        source_url: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl ListedContent {
    /// The URL this content points at, when it has one. Link bookmarks use
    /// their URL directly; asset bookmarks fall back to the crawl source.
    pub fn url(&self) -> Option<&str> {
        match self {
            ListedContent::Link { url } => Some(url),
            ListedContent::Asset { source_url } => source_url.as_deref(),
            ListedContent::Other => None,
        }
    }
}

/// A pre-existing server-side bookmark, keyed by URL for dedup lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingBookmark {
    pub id: String,
    pub created_at: i64,
    pub note: Option<String>,
}
