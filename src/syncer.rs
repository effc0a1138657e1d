//! Idempotent sync of converted bookmarks against a Karakeep server.
//!
//! Each bookmark is proposed with create-or-get; existing bookmarks are
//! reconciled with two independent rules: earliest-wins creation timestamps
//! and substring-aware note merging. Re-running a sync converges to the
//! same server state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::converter::{Bookmark, NOTE_SEPARATOR};
use crate::karakeep::{rfc3339_to_unix, unix_to_rfc3339, KarakeepClient, KarakeepError};
use crate::output::ProgressLine;
use crate::runner;

const DEFAULT_CONCURRENCY: usize = 5;

/// Terminal classification of one bookmark's sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Created,
    Updated,
    Skipped,
}

/// One bookmark that could not be synced, with its identifying URL.
#[derive(Debug)]
pub struct SyncFailure {
    pub url: String,
    pub error: KarakeepError,
}

/// Per-decision tally plus the itemized failures for end-of-run reporting.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Pushes converted bookmarks to Karakeep under bounded concurrency.
pub struct Syncer {
    client: Arc<KarakeepClient>,
    concurrency: usize,
    progress: Option<Arc<ProgressLine>>,
}

impl Syncer {
    pub fn new(client: Arc<KarakeepClient>) -> Self {
        Self {
            client,
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

    /// Syncs every bookmark, isolating per-bookmark failures.
    ///
    /// On cancellation the report covers only the bookmarks that completed
    /// before the signal fired.
    pub async fn sync(&self, token: &CancellationToken, bookmarks: Vec<Bookmark>) -> SyncReport {
        let total = bookmarks.len();
        let counter = Arc::new(AtomicUsize::new(0));

        let client = Arc::clone(&self.client);
        let progress = self.progress.clone();
        let worker_token = token.clone();

        let results = runner::run(
            token,
            self.concurrency,
            bookmarks,
            move |bookmark: Bookmark| {
                let client = Arc::clone(&client);
                let counter = Arc::clone(&counter);
                let progress = progress.clone();
                let token = worker_token.clone();
                async move {
                    let url = bookmark.url().unwrap_or_default().to_string();
                    let outcome = sync_task(&client, &token, &bookmark).await;
                    if !token.is_cancelled() {
                        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(progress) = &progress {
                            progress.update(done, total);
                        }
                        info!(done, total, url = %url, "pushed bookmark");
                    }
                    (url, outcome)
                }
            },
        )
        .await;

        let mut report = SyncReport::default();
        for (url, outcome) in results {
            match outcome {
                Ok(SyncDecision::Created) => report.created += 1,
                Ok(SyncDecision::Updated) => report.updated += 1,
                Ok(SyncDecision::Skipped) => report.skipped += 1,
                Err(error) => {
                    warn!(url = %url, error = %error, "failed to push bookmark");
                    report.failures.push(SyncFailure { url, error });
                }
            }
        }
        report
    }
}

/// Reconciles one bookmark against the server.
///
/// 1. Create-or-get by URL.
/// 2. Attach tags (idempotent) whether fresh or existing.
/// 3. Fresh bookmarks are done: Created.
/// 4. Existing bookmarks get two independent change checks — earliest-wins
///    timestamp and note merge — and a single PATCH when either changed.
async fn sync_task(
    client: &KarakeepClient,
    token: &CancellationToken,
    bookmark: &Bookmark,
) -> Result<SyncDecision, KarakeepError> {
    let url = bookmark
        .url()
        .ok_or_else(|| KarakeepError::Decode("bookmark has no link content".to_string()))?;

    let (remote, already_exists) = client
        .create_bookmark(
            token,
            url,
            &unix_to_rfc3339(bookmark.created_at),
            bookmark.title.clone(),
            bookmark.note.clone(),
        )
        .await?;

    if !bookmark.tags.is_empty() {
        client.attach_tags(token, &remote.id, &bookmark.tags).await?;
    }

    if !already_exists {
        return Ok(SyncDecision::Created);
    }

    // existing bookmark: decide whether anything actually needs updating
    let remote_created_at = rfc3339_to_unix(&remote.created_at)
        .map_err(|e| KarakeepError::Decode(format!("parsing existing createdAt: {e}")))?;

    let timestamp_changed = bookmark.created_at < remote_created_at;
    let updated_created_at = timestamp_changed.then(|| unix_to_rfc3339(bookmark.created_at));

    let (updated_note, note_changed) =
        merge_notes(remote.note.as_deref(), bookmark.note.as_deref());

    if !timestamp_changed && !note_changed {
        return Ok(SyncDecision::Skipped);
    }

    client
        .update_bookmark(token, &remote.id, updated_created_at, updated_note)
        .await?;
    Ok(SyncDecision::Updated)
}

/// Merges an incoming note into an existing one.
///
/// Returns the note to store and whether an update is needed:
/// - empty incoming note: no change;
/// - existing already contains the incoming text: no change (this is what
///   makes re-syncing idempotent);
/// - empty existing: the trimmed incoming note;
/// - otherwise: existing and incoming joined by [`NOTE_SEPARATOR`], trimmed.
fn merge_notes(existing: Option<&str>, incoming: Option<&str>) -> (Option<String>, bool) {
    let existing_note = existing.unwrap_or_default();

    let incoming = match incoming {
        Some(note) if !note.is_empty() => note,
        _ => return (existing.map(String::from), false),
    };

    if existing_note.contains(incoming) {
        return (existing.map(String::from), false);
    }

    if existing_note.is_empty() {
        let result = incoming.trim();
        if result.is_empty() {
            return (None, false);
        }
        return (Some(result.to_string()), true);
    }

    let merged = format!("{existing_note}{NOTE_SEPARATOR}{incoming}")
        .trim()
        .to_string();
    (Some(merged), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_notes_no_incoming_means_no_update() {
        assert_eq!(merge_notes(Some("keep"), None), (Some("keep".into()), false));
        assert_eq!(merge_notes(Some("keep"), Some("")), (Some("keep".into()), false));
        assert_eq!(merge_notes(None, None), (None, false));
    }

    #[test]
    fn merge_notes_substring_match_is_idempotent() {
        // "abc" already contains "b": re-syncing must not duplicate it
        assert_eq!(merge_notes(Some("abc"), Some("b")), (Some("abc".into()), false));
        assert_eq!(
            merge_notes(Some("exact"), Some("exact")),
            (Some("exact".into()), false)
        );
    }

    #[test]
    fn merge_notes_fills_an_empty_existing_note() {
        assert_eq!(merge_notes(None, Some("x")), (Some("x".into()), true));
        assert_eq!(merge_notes(Some(""), Some("  x  ")), (Some("x".into()), true));
        // whitespace-only incoming collapses to nothing
        assert_eq!(merge_notes(None, Some("   ")), (None, false));
    }

    #[test]
    fn merge_notes_appends_with_the_separator() {
        // "foo" does not contain "foo bar", so the merge appends
        assert_eq!(
            merge_notes(Some("foo"), Some("foo bar")),
            (Some("foo\n\n---\n\nfoo bar".into()), true)
        );
    }

    #[test]
    fn merge_notes_is_idempotent_when_applied_twice() {
        let (first, changed) = merge_notes(Some("foo"), Some("foo bar"));
        assert!(changed);
        // the merged note now contains the incoming text verbatim
        let (second, changed_again) = merge_notes(first.as_deref(), Some("foo bar"));
        assert!(!changed_again);
        assert_eq!(first, second);
    }
}
