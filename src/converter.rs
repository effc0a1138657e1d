//! Fetch stage and Karakeep export conversion.
//!
//! `fetch_items` enriches parsed Harmonic bookmarks with Hacker News item
//! metadata under bounded concurrency; `convert` turns the result into the
//! Karakeep export schema (tag assignment, note templates, URL dedupe).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hackernews::{discussion_url, CachedClient, HnClient, HnError, Item};
use crate::harmonic::HarmonicBookmark;
use crate::output::ProgressLine;
use crate::runner;

/// Separator between merged notes (duplicate URLs, re-synced bookmarks).
pub const NOTE_SEPARATOR: &str = "\n\n---\n\n";

const DEFAULT_CONCURRENCY: usize = 5;

/// Source of Hacker News items; implemented by the plain client and the
/// caching wrapper so the fetch stage doesn't care which it gets.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    async fn get_item(&self, token: &CancellationToken, id: u64) -> Result<Item, HnError>;
}

#[async_trait]
impl ItemFetcher for HnClient {
    async fn get_item(&self, token: &CancellationToken, id: u64) -> Result<Item, HnError> {
        HnClient::get_item(self, token, id).await
    }
}

#[async_trait]
impl ItemFetcher for CachedClient {
    async fn get_item(&self, token: &CancellationToken, id: u64) -> Result<Item, HnError> {
        CachedClient::get_item(self, token, id).await
    }
}

/// The Karakeep export/import file schema.
/// See packages/shared/import-export/exporters.ts in the Karakeep codebase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub bookmarks: Vec<Bookmark>,
}

/// A single bookmark in the export file. `title` and `note` serialize as
/// explicit nulls and `tags` always as an array, matching what the Karakeep
/// importer expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    /// Unix timestamp in seconds.
    pub created_at: i64,
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: Option<BookmarkContent>,
    pub note: Option<String>,
}

impl Bookmark {
    /// The bookmarked URL, when the content is a link.
    pub fn url(&self) -> Option<&str> {
        self.content.as_ref().map(|c| c.url.as_str())
    }
}

/// Link content object. The schema supports a link/text union; this tool
/// only ever produces links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl BookmarkContent {
    pub fn link(url: impl Into<String>) -> Self {
        Self {
            kind: "link".to_string(),
            url: url.into(),
        }
    }
}

/// Conversion options beyond the fetched data itself.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Tags applied to every converted bookmark.
    pub tags: Vec<String>,
    /// Template for the note field; empty means no note.
    pub note_template: String,
    /// Merge duplicate URLs, combining their notes.
    pub dedupe: bool,
}

/// Orchestrates the fetch stage and the conversion to the export schema.
pub struct Converter {
    fetcher: Arc<dyn ItemFetcher>,
    concurrency: usize,
    progress: Option<Arc<ProgressLine>>,
}

impl Converter {
    pub fn new(fetcher: Arc<dyn ItemFetcher>) -> Self {
        Self {
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
            progress: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressLine>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetches the Hacker News item for every bookmark concurrently.
    ///
    /// Items that are gone (not found, deleted, dead) or kept failing after
    /// retries are logged and excluded; they never fail the batch. Only
    /// cancellation aborts the stage, since the result set would be
    /// incomplete.
    pub async fn fetch_items(
        &self,
        token: &CancellationToken,
        bookmarks: &[HarmonicBookmark],
    ) -> anyhow::Result<HashMap<u64, Item>> {
        let total = bookmarks.len();
        let counter = Arc::new(AtomicUsize::new(0));

        let fetcher = Arc::clone(&self.fetcher);
        let progress = self.progress.clone();
        let worker_token = token.clone();

        let results = runner::run(
            token,
            self.concurrency,
            bookmarks.to_vec(),
            move |bookmark: HarmonicBookmark| {
                let fetcher = Arc::clone(&fetcher);
                let counter = Arc::clone(&counter);
                let progress = progress.clone();
                let token = worker_token.clone();
                async move {
                    let item = fetcher.get_item(&token, bookmark.id).await;
                    if !token.is_cancelled() {
                        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(progress) = &progress {
                            progress.update(done, total);
                        }
                        info!(done, total, id = bookmark.id, "fetched item");
                    }
                    (bookmark, item)
                }
            },
        )
        .await;

        if token.is_cancelled() {
            bail!("fetch cancelled before completion");
        }

        let mut items = HashMap::new();
        for (bookmark, result) in results {
            match result {
                Ok(item) => {
                    items.insert(bookmark.id, item);
                }
                Err(HnError::NotFound) => {
                    warn!(id = bookmark.id, "item not found, skipping");
                }
                Err(e) => {
                    warn!(id = bookmark.id, error = %e, "failed to fetch item, skipping");
                }
            }
        }
        Ok(items)
    }

    /// Converts fetched items into the Karakeep export schema.
    ///
    /// Bookmarks whose item is missing from `items` (excluded during fetch)
    /// are dropped. Returns the schema plus the number of duplicate URLs
    /// merged away when deduping.
    pub fn convert(
        &self,
        bookmarks: &[HarmonicBookmark],
        items: &HashMap<u64, Item>,
        options: &ConvertOptions,
    ) -> (Schema, usize) {
        let mut export = Schema::default();
        let mut seen_urls: HashMap<String, usize> = HashMap::new();
        let mut deduped = 0;

        for bookmark in bookmarks {
            let Some(item) = items.get(&bookmark.id) else {
                continue;
            };

            let url = match item.url.as_deref() {
                Some(url) if !url.is_empty() => url.to_string(),
                _ => discussion_url(item.id),
            };

            let note = if options.note_template.is_empty() {
                String::new()
            } else {
                render_note(&options.note_template, item)
            };

            if options.dedupe {
                if let Some(&index) = seen_urls.get(&url) {
                    // duplicate URL: merge the new note into the kept entry
                    if !note.is_empty() {
                        let existing = &mut export.bookmarks[index];
                        existing.note = match existing.note.take() {
                            Some(prev) if !prev.is_empty() => {
                                Some(format!("{prev}{NOTE_SEPARATOR}{note}"))
                            }
                            _ => Some(note),
                        };
                    }
                    deduped += 1;
                    continue;
                }
                seen_urls.insert(url.clone(), export.bookmarks.len());
            }

            export.bookmarks.push(Bookmark {
                created_at: bookmark.timestamp,
                title: item.title.clone(),
                tags: options.tags.clone(),
                content: Some(BookmarkContent::link(url)),
                note: (!note.is_empty()).then_some(note),
            });
        }

        (export, deduped)
    }
}

/// Renders a note template against one item. Unknown placeholders are left
/// verbatim.
fn render_note(template: &str, item: &Item) -> String {
    let hn_url = discussion_url(item.id);
    let item_url = item.url.clone().unwrap_or_default();
    // {{smart_url}} is the discussion link for stories that have their own
    // URL (so the note complements the bookmarked link), and empty for
    // self-posts whose bookmark already points at the discussion
    let smart_url = if item_url.is_empty() { "" } else { hn_url.as_str() };
    let date = chrono::DateTime::<chrono::Utc>::from_timestamp(item.time, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    template
        .replace("{{smart_url}}", smart_url)
        .replace("{{item_url}}", &item_url)
        .replace("{{hn_url}}", &hn_url)
        .replace("{{id}}", &item.id.to_string())
        .replace("{{title}}", item.title.as_deref().unwrap_or_default())
        .replace("{{author}}", item.by.as_deref().unwrap_or_default())
        .replace("{{date}}", &date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: u64, title: &str, url: Option<&str>) -> Item {
        Item {
            id,
            title: Some(title.to_string()),
            url: url.map(String::from),
            by: Some("pg".to_string()),
            time: 1704067200, // 2024-01-01
            kind: Some("story".to_string()),
            ..Item::default()
        }
    }

    fn converter() -> Converter {
        struct NoFetch;
        #[async_trait]
        impl ItemFetcher for NoFetch {
            async fn get_item(&self, _: &CancellationToken, _: u64) -> Result<Item, HnError> {
                Err(HnError::NotFound)
            }
        }
        Converter::new(Arc::new(NoFetch))
    }

    #[test]
    fn convert_builds_link_bookmarks() {
        let bookmarks = vec![HarmonicBookmark {
            id: 1,
            timestamp: 1700000000,
        }];
        let mut items = HashMap::new();
        items.insert(1, story(1, "A Story", Some("https://example.com")));

        let options = ConvertOptions {
            tags: vec!["src:hackernews".to_string()],
            note_template: String::new(),
            dedupe: true,
        };
        let (export, deduped) = converter().convert(&bookmarks, &items, &options);

        assert_eq!(deduped, 0);
        assert_eq!(export.bookmarks.len(), 1);
        let bm = &export.bookmarks[0];
        assert_eq!(bm.created_at, 1700000000);
        assert_eq!(bm.title.as_deref(), Some("A Story"));
        assert_eq!(bm.url(), Some("https://example.com"));
        assert_eq!(bm.tags, vec!["src:hackernews"]);
        assert!(bm.note.is_none());
    }

    #[test]
    fn convert_skips_bookmarks_without_items() {
        let bookmarks = vec![
            HarmonicBookmark {
                id: 1,
                timestamp: 100,
            },
            HarmonicBookmark {
                id: 2,
                timestamp: 200,
            },
        ];
        let mut items = HashMap::new();
        items.insert(2, story(2, "Kept", Some("https://kept.com")));

        let (export, _) = converter().convert(&bookmarks, &items, &ConvertOptions::default());
        assert_eq!(export.bookmarks.len(), 1);
        assert_eq!(export.bookmarks[0].url(), Some("https://kept.com"));
    }

    #[test]
    fn convert_falls_back_to_the_discussion_url() {
        let bookmarks = vec![HarmonicBookmark {
            id: 8863,
            timestamp: 100,
        }];
        let mut items = HashMap::new();
        items.insert(8863, story(8863, "Ask HN", None));

        let (export, _) = converter().convert(&bookmarks, &items, &ConvertOptions::default());
        assert_eq!(
            export.bookmarks[0].url(),
            Some("https://news.ycombinator.com/item?id=8863")
        );
    }

    #[test]
    fn render_note_fills_placeholders() {
        let item = story(8863, "My YC app: Dropbox", Some("https://getdropbox.com"));
        let note = render_note("{{title}} by {{author}} on {{date}} ({{id}})", &item);
        assert_eq!(note, "My YC app: Dropbox by pg on 2024-01-01 (8863)");
    }

    #[test]
    fn smart_url_is_empty_for_self_posts() {
        let with_url = story(1, "Story", Some("https://example.com"));
        assert_eq!(
            render_note("{{smart_url}}", &with_url),
            discussion_url(1)
        );

        let self_post = story(2, "Ask HN", None);
        assert_eq!(render_note("{{smart_url}}", &self_post), "");
        // {{hn_url}} always resolves, even for self posts
        assert_eq!(render_note("{{hn_url}}", &self_post), discussion_url(2));
    }

    #[test]
    fn dedupe_merges_notes_for_duplicate_urls() {
        let bookmarks = vec![
            HarmonicBookmark {
                id: 1,
                timestamp: 100,
            },
            HarmonicBookmark {
                id: 2,
                timestamp: 200,
            },
        ];
        let mut items = HashMap::new();
        items.insert(1, story(1, "First", Some("https://same.com")));
        items.insert(2, story(2, "Second", Some("https://same.com")));

        let options = ConvertOptions {
            tags: Vec::new(),
            note_template: "{{id}}".to_string(),
            dedupe: true,
        };
        let (export, deduped) = converter().convert(&bookmarks, &items, &options);

        assert_eq!(deduped, 1);
        assert_eq!(export.bookmarks.len(), 1);
        assert_eq!(
            export.bookmarks[0].note.as_deref(),
            Some("1\n\n---\n\n2")
        );
    }

    #[test]
    fn no_dedupe_keeps_duplicate_urls() {
        let bookmarks = vec![
            HarmonicBookmark {
                id: 1,
                timestamp: 100,
            },
            HarmonicBookmark {
                id: 2,
                timestamp: 200,
            },
        ];
        let mut items = HashMap::new();
        items.insert(1, story(1, "First", Some("https://same.com")));
        items.insert(2, story(2, "Second", Some("https://same.com")));

        let (export, deduped) =
            converter().convert(&bookmarks, &items, &ConvertOptions::default());
        assert_eq!(deduped, 0);
        assert_eq!(export.bookmarks.len(), 2);
    }

    #[test]
    fn export_schema_serializes_nullable_fields_and_tag_arrays() {
        let bm = Bookmark {
            created_at: 100,
            title: None,
            tags: Vec::new(),
            content: Some(BookmarkContent::link("https://a.com")),
            note: None,
        };
        let value = serde_json::to_value(&bm).unwrap();
        assert!(value["title"].is_null());
        assert!(value["note"].is_null());
        assert_eq!(value["tags"], serde_json::json!([]));
        assert_eq!(value["content"]["type"], "link");
        assert_eq!(value["createdAt"], 100);
    }
}
