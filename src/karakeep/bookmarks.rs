//! Bookmark operations against the Karakeep API.

use std::collections::HashMap;

use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry;

use super::client::{KarakeepClient, KarakeepError};
use super::rfc3339_to_unix;
use super::types::{
    AttachTagsRequest, CreateBookmarkRequest, CreateBookmarkResponse, ExistingBookmark,
    ListBookmarksResponse, TagRequest, UpdateBookmarkRequest,
};

const LIST_PAGE_SIZE: u32 = 100;

impl KarakeepClient {
    /// Creates a link bookmark, or returns the existing one for the URL.
    ///
    /// The API answers 201 for a freshly created bookmark and 200 with the
    /// unedited existing record when the URL is already known; the boolean
    /// reports which happened.
    pub async fn create_bookmark(
        &self,
        token: &CancellationToken,
        url: &str,
        created_at: &str,
        title: Option<String>,
        note: Option<String>,
    ) -> Result<(CreateBookmarkResponse, bool), KarakeepError> {
        let body = CreateBookmarkRequest::link(url, created_at, title, note);
        retry::execute(self.retry_policy(), token, || self.create_once(&body)).await
    }

    async fn create_once(
        &self,
        body: &CreateBookmarkRequest,
    ) -> Result<(CreateBookmarkResponse, bool), KarakeepError> {
        let response = self
            .send(self.request(Method::POST, "/bookmarks").json(body))
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED && status != StatusCode::OK {
            return Err(self.api_error(response).await);
        }

        let already_exists = status == StatusCode::OK;
        let bookmark: CreateBookmarkResponse = response
            .json()
            .await
            .map_err(|e| KarakeepError::Decode(format!("decoding response: {e}")))?;
        Ok((bookmark, already_exists))
    }

    /// Attaches tags to a bookmark. The endpoint is idempotent: existing
    /// tags are not duplicated. An empty tag list is a local no-op.
    pub async fn attach_tags(
        &self,
        token: &CancellationToken,
        id: &str,
        tags: &[String],
    ) -> Result<(), KarakeepError> {
        if tags.is_empty() {
            return Ok(());
        }

        let path = format!("/bookmarks/{id}/tags");
        let body = AttachTagsRequest {
            tags: tags
                .iter()
                .map(|tag| TagRequest {
                    tag_name: tag.clone(),
                })
                .collect(),
        };
        retry::execute(self.retry_policy(), token, || {
            self.mutate_once(Method::POST, &path, &body)
        })
        .await
    }

    /// Updates the creation timestamp and/or note of an existing bookmark.
    /// `None` fields are left untouched server-side.
    pub async fn update_bookmark(
        &self,
        token: &CancellationToken,
        id: &str,
        created_at: Option<String>,
        note: Option<String>,
    ) -> Result<(), KarakeepError> {
        let path = format!("/bookmarks/{id}");
        let body = UpdateBookmarkRequest { created_at, note };
        retry::execute(self.retry_policy(), token, || {
            self.mutate_once(Method::PATCH, &path, &body)
        })
        .await
    }

    /// One attempt of a bookmark mutation where 404 means the target is
    /// gone (terminal) and 200 is the only success.
    async fn mutate_once<B: serde::Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), KarakeepError> {
        let response = self.send(self.request(method, path).json(body)).await?;
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(KarakeepError::BookmarkNotFound);
        }
        Err(self.api_error(response).await)
    }

    /// Fetches every bookmark, paginating by cursor, and returns them keyed
    /// by URL for client-side dedup. Entries without a URL (text bookmarks)
    /// or with malformed timestamps are skipped.
    pub async fn list_bookmarks(
        &self,
        token: &CancellationToken,
    ) -> Result<HashMap<String, ExistingBookmark>, KarakeepError> {
        let mut result = HashMap::new();
        let mut cursor: Option<String> = None;
        let mut page = 1u32;

        loop {
            if token.is_cancelled() {
                return Err(KarakeepError::Cancelled);
            }

            let listing =
                retry::execute(self.retry_policy(), token, || self.list_page(&cursor)).await?;

            debug!(page, count = listing.bookmarks.len(), "listed bookmarks page");

            for bookmark in listing.bookmarks {
                let Some(url) = bookmark.content.as_ref().and_then(|c| c.url()) else {
                    continue;
                };
                let Ok(created_at) = rfc3339_to_unix(&bookmark.created_at) else {
                    continue;
                };
                result.insert(
                    url.to_string(),
                    ExistingBookmark {
                        id: bookmark.id,
                        created_at,
                        note: bookmark.note,
                    },
                );
            }

            match listing.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
            page += 1;
        }

        Ok(result)
    }

    async fn list_page(
        &self,
        cursor: &Option<String>,
    ) -> Result<ListBookmarksResponse, KarakeepError> {
        let mut request = self
            .request(Method::GET, "/bookmarks")
            .query(&[("limit", LIST_PAGE_SIZE.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = self.send(request).await?;
        if response.status() != StatusCode::OK {
            return Err(self.api_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| KarakeepError::Decode(format!("decoding response: {e}")))
    }
}
