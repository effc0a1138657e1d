//! Fetch-stage behavior with a scripted item source: per-item exclusion,
//! batch isolation, and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hnkeep::converter::{Converter, ItemFetcher};
use hnkeep::hackernews::{HnError, Item};
use hnkeep::harmonic::HarmonicBookmark;

/// Item source scripted per id; everything else resolves to a story.
struct ScriptedFetcher {
    outcomes: HashMap<u64, HnError>,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    fn new(outcomes: HashMap<u64, HnError>) -> Self {
        Self {
            outcomes,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ItemFetcher for ScriptedFetcher {
    async fn get_item(&self, _token: &CancellationToken, id: u64) -> Result<Item, HnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.outcomes.get(&id) {
            Some(err) => Err(err.clone()),
            None => Ok(Item {
                id,
                time: 1700000000,
                title: Some(format!("Story {id}")),
                url: Some(format!("https://example.com/{id}")),
                ..Item::default()
            }),
        }
    }
}

fn bookmarks(ids: &[u64]) -> Vec<HarmonicBookmark> {
    ids.iter()
        .map(|&id| HarmonicBookmark {
            id,
            timestamp: 1700000000,
        })
        .collect()
}

#[tokio::test]
async fn terminal_and_exhausted_items_are_excluded_not_fatal() {
    let fetcher = Arc::new(ScriptedFetcher::new(HashMap::from([
        (2, HnError::NotFound),
        (3, HnError::Deleted),
        (4, HnError::Dead),
        (
            5,
            HnError::Exhausted {
                attempts: 3,
                source: Box::new(HnError::Status(500)),
            },
        ),
    ])));
    let converter = Converter::new(Arc::clone(&fetcher) as Arc<dyn ItemFetcher>);

    let items = converter
        .fetch_items(&CancellationToken::new(), &bookmarks(&[1, 2, 3, 4, 5, 6]))
        .await
        .unwrap();

    // the two healthy items survive; four were excluded with warnings
    assert_eq!(items.len(), 2);
    assert!(items.contains_key(&1));
    assert!(items.contains_key(&6));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn cancellation_fails_the_whole_stage() {
    let mut fetcher = ScriptedFetcher::new(HashMap::new());
    fetcher.delay = Duration::from_millis(20);
    let fetcher = Arc::new(fetcher);

    let converter = Converter::new(Arc::clone(&fetcher) as Arc<dyn ItemFetcher>)
        .with_concurrency(1);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = converter
        .fetch_items(&token, &bookmarks(&(1..=50).collect::<Vec<_>>()))
        .await;

    // partial enrichment is an error: the caller must not export half a run
    assert!(result.is_err());
    assert!(fetcher.calls.load(Ordering::SeqCst) < 50);
}

#[tokio::test]
async fn sequential_fetching_respects_concurrency_one() {
    let mut fetcher = ScriptedFetcher::new(HashMap::new());
    fetcher.delay = Duration::from_millis(50);
    let fetcher = Arc::new(fetcher);

    let converter = Converter::new(Arc::clone(&fetcher) as Arc<dyn ItemFetcher>)
        .with_concurrency(1);

    let start = std::time::Instant::now();
    let items = converter
        .fetch_items(&CancellationToken::new(), &bookmarks(&[1, 2, 3, 4, 5]))
        .await
        .unwrap();

    assert_eq!(items.len(), 5);
    // five 50ms fetches through one slot: at least 250ms of wall time
    assert!(start.elapsed() >= Duration::from_millis(250));
}
