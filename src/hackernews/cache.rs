//! On-disk response cache with negative caching and single-flight dedup.
//!
//! One JSON file per item id. Success and permanent item states (deleted,
//! dead) are persisted; transient failures never are. Concurrent requests
//! for the same uncached id share a single network fetch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::HnClient;
use super::types::{HnError, Item};

const CACHE_ERR_DELETED: &str = "deleted";
const CACHE_ERR_DEAD: &str = "dead";

type FetchResult = Result<Item, HnError>;

/// Persisted cache entry: a positive payload or a permanent-error tag,
/// never both. Anything else is corruption and reads as a miss.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    item: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// [`HnClient`] wrapper that caches responses on disk and deduplicates
/// concurrent in-flight fetches per id.
pub struct CachedClient {
    client: HnClient,
    cache_dir: PathBuf,
    // in-flight fetches by id; each receiver resolves to the shared result.
    // The lock only guards map mutation, never network or file I/O.
    inflight: Mutex<HashMap<u64, watch::Receiver<Option<FetchResult>>>>,
    cache_hits: AtomicU64,
}

impl CachedClient {
    /// Wraps `client`, creating `cache_dir` if needed.
    pub fn new(client: HnClient, cache_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            client,
            cache_dir,
            inflight: Mutex::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
        })
    }

    /// Retrieves an item by id, consulting the cache first.
    ///
    /// Negative entries surface the original error kind but count as cache
    /// hits. On a miss, concurrent callers for the same id all wait on one
    /// fetch and receive the identical result.
    pub async fn get_item(&self, token: &CancellationToken, id: u64) -> Result<Item, HnError> {
        if token.is_cancelled() {
            return Err(HnError::Cancelled);
        }

        if let Some(cached) = self.read_cache(id).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            match &cached {
                Ok(_) => debug!(id, "cache hit"),
                Err(e) => debug!(id, state = %e, "cache hit (negative)"),
            }
            return cached;
        }

        // cache miss: either join the in-flight fetch for this id or
        // register as the single fetcher
        let publish = {
            let mut inflight = self.inflight.lock().await;
            if let Some(rx) = inflight.get(&id) {
                let mut rx = rx.clone();
                drop(inflight);
                loop {
                    if let Some(result) = rx.borrow_and_update().clone() {
                        return result;
                    }
                    if rx.changed().await.is_err() {
                        // the fetcher went away without publishing; only a
                        // cancelled run drops a fetch on the floor
                        return rx.borrow().clone().unwrap_or(Err(HnError::Cancelled));
                    }
                }
            }
            let (tx, rx) = watch::channel(None);
            inflight.insert(id, rx);
            tx
        };

        // fetch outside the lock
        let result = self.client.get_item(token, id).await;

        // persist before waiters are released; a failed cache write must
        // never fail the fetch itself
        if !token.is_cancelled() {
            if let Err(e) = self.write_cache(id, &result).await {
                warn!(id, error = %e, "failed to write cache entry");
            }
        }

        self.inflight.lock().await.remove(&id);
        let _ = publish.send(Some(result.clone()));

        result
    }

    /// Number of cache hits (positive and negative) so far.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Removes all persisted entries. In-flight fetches are unaffected.
    pub async fn clear_cache(&self) -> std::io::Result<()> {
        tokio::fs::remove_dir_all(&self.cache_dir).await?;
        tokio::fs::create_dir_all(&self.cache_dir).await
    }

    fn cache_path(&self, id: u64) -> PathBuf {
        self.cache_dir.join(format!("{id}.json"))
    }

    /// Reads the entry for `id`. Missing, unreadable, or corrupt files all
    /// read as `None`; caching is best-effort and never surfaces errors.
    async fn read_cache(&self, id: u64) -> Option<FetchResult> {
        let data = tokio::fs::read(self.cache_path(id)).await.ok()?;
        let entry: CacheEntry = serde_json::from_slice(&data).ok()?;

        match (entry.item, entry.error.as_deref()) {
            // both set is invalid by construction
            (Some(_), Some(_)) => None,
            (_, Some(CACHE_ERR_DELETED)) => Some(Err(HnError::Deleted)),
            (_, Some(CACHE_ERR_DEAD)) => Some(Err(HnError::Dead)),
            // unknown error tags are ignored
            (_, Some(_)) => None,
            (Some(item), None) => Some(Ok(item)),
            (None, None) => None,
        }
    }

    /// Persists a cacheable outcome for `id`: the item on success, or the
    /// permanent-error tag for deleted/dead. Everything else is skipped.
    async fn write_cache(&self, id: u64, result: &FetchResult) -> std::io::Result<()> {
        let entry = match result {
            Ok(item) => CacheEntry {
                item: Some(item.clone()),
                ..CacheEntry::default()
            },
            Err(HnError::Deleted) => CacheEntry {
                error: Some(CACHE_ERR_DELETED.to_string()),
                ..CacheEntry::default()
            },
            Err(HnError::Dead) => CacheEntry {
                error: Some(CACHE_ERR_DEAD.to_string()),
                ..CacheEntry::default()
            },
            Err(_) => return Ok(()),
        };

        let data = serde_json::to_vec(&entry)?;
        tokio::fs::write(self.cache_path(id), data).await
    }
}

impl std::fmt::Debug for CachedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedClient")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}
